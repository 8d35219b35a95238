use crate::error::{PipelineError, Result};
use crate::models::{RecordSet, WeatherRow};
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE,
};
use arrow::array::*;
use arrow::datatypes::{ArrowPrimitiveType, DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::sync::Arc;

const UTC: &str = "UTC";

pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY => Compression::SNAPPY,
            COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
            COMPRESSION_LZ4 => Compression::LZ4,
            COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
            COMPRESSION_NONE => Compression::UNCOMPRESSED,
            _ => {
                return Err(PipelineError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    /// Encode a record set as a Parquet file held in memory
    pub fn to_bytes(&self, records: &RecordSet) -> Result<Vec<u8>> {
        let schema = Self::schema();
        let batch = self.records_to_batch(&records.rows, schema.clone())?;

        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        Ok(buffer)
    }

    /// Arrow schema shared by every artifact. Column order matches
    /// `WEATHER_COLUMNS`.
    pub fn schema() -> SchemaRef {
        let timestamp = DataType::Timestamp(TimeUnit::Millisecond, Some(UTC.into()));

        let fields = vec![
            Field::new("latitude", DataType::Float64, false),
            Field::new("longitude", DataType::Float64, false),
            Field::new("retrieved_at", timestamp.clone(), false),
            Field::new("observed_at", timestamp, true),
            Field::new("station_name", DataType::Utf8, true),
            Field::new("country", DataType::Utf8, true),
            Field::new("temperature", DataType::Float64, false),
            Field::new("feels_like", DataType::Float64, true),
            Field::new("temp_min", DataType::Float64, true),
            Field::new("temp_max", DataType::Float64, true),
            Field::new("humidity", DataType::Float64, false),
            Field::new("pressure", DataType::Float64, false),
            Field::new("wind_speed", DataType::Float64, false),
            Field::new("wind_deg", DataType::Float64, true),
            Field::new("wind_gust", DataType::Float64, true),
            Field::new("cloudiness", DataType::Float64, true),
            Field::new("visibility", DataType::Float64, true),
            Field::new("weather_condition", DataType::Utf8, false),
            Field::new("weather_description", DataType::Utf8, true),
            Field::new("raw_payload", DataType::Utf8, true),
        ];

        Arc::new(Schema::new(fields))
    }

    /// Convert rows to an Arrow RecordBatch
    fn records_to_batch(&self, rows: &[WeatherRow], schema: SchemaRef) -> Result<RecordBatch> {
        let f64_column = |f: fn(&WeatherRow) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
        };
        let opt_f64_column = |f: fn(&WeatherRow) -> Option<f64>| -> ArrayRef {
            Arc::new(Float64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
        };
        let opt_str_column = |f: fn(&WeatherRow) -> Option<&str>| -> ArrayRef {
            Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
        };

        let retrieved_at: Vec<i64> = rows.iter().map(|r| r.retrieved_at.timestamp_millis()).collect();
        let observed_at: Vec<Option<i64>> = rows
            .iter()
            .map(|r| r.observed_at.map(|t| t.timestamp_millis()))
            .collect();
        let conditions: Vec<&str> = rows.iter().map(|r| r.weather_condition.as_str()).collect();

        let columns: Vec<ArrayRef> = vec![
            f64_column(|r| r.latitude),
            f64_column(|r| r.longitude),
            Arc::new(TimestampMillisecondArray::from(retrieved_at).with_timezone(UTC)),
            Arc::new(TimestampMillisecondArray::from(observed_at).with_timezone(UTC)),
            opt_str_column(|r| r.station_name.as_deref()),
            opt_str_column(|r| r.country.as_deref()),
            f64_column(|r| r.temperature),
            opt_f64_column(|r| r.feels_like),
            opt_f64_column(|r| r.temp_min),
            opt_f64_column(|r| r.temp_max),
            f64_column(|r| r.humidity),
            f64_column(|r| r.pressure),
            f64_column(|r| r.wind_speed),
            opt_f64_column(|r| r.wind_deg),
            opt_f64_column(|r| r.wind_gust),
            opt_f64_column(|r| r.cloudiness),
            opt_f64_column(|r| r.visibility),
            Arc::new(StringArray::from(conditions)),
            opt_str_column(|r| r.weather_description.as_deref()),
            opt_str_column(|r| r.raw_payload.as_deref()),
        ];

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Decode an artifact back into rows
    pub fn read_rows(&self, content: &[u8]) -> Result<Vec<WeatherRow>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(content))?
            .with_batch_size(8192)
            .build()?;

        let mut rows = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            rows.extend(batch_to_rows(&batch)?);
        }

        Ok(rows)
    }

    /// Schema embedded in an artifact
    pub fn read_schema(&self, content: &[u8]) -> Result<SchemaRef> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(content))?;
        Ok(builder.schema().clone())
    }

    /// Get artifact statistics
    pub fn inspect(&self, content: &[u8]) -> Result<ParquetFileInfo> {
        let reader = SerializedFileReader::new(Bytes::copy_from_slice(content))?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let total_rows = metadata.file_metadata().num_rows();
        let compression = if row_groups > 0 && metadata.row_group(0).num_columns() > 0 {
            Some(metadata.row_group(0).column(0).compression())
        } else {
            None
        };

        Ok(ParquetFileInfo {
            total_rows,
            row_groups: row_groups as i32,
            file_size: content.len() as u64,
            compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|array| array.as_any().downcast_ref::<T>())
        .ok_or_else(|| PipelineError::Serialization(format!("Invalid {} column", name)))
}

fn opt_value<T: ArrowPrimitiveType>(array: &PrimitiveArray<T>, index: usize) -> Option<T::Native> {
    array.is_valid(index).then(|| array.value(index))
}

fn opt_string(array: &StringArray, index: usize) -> Option<String> {
    array.is_valid(index).then(|| array.value(index).to_string())
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| PipelineError::Serialization(format!("Timestamp out of range: {}", millis)))
}

fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<WeatherRow>> {
    let latitude = column::<Float64Array>(batch, "latitude")?;
    let longitude = column::<Float64Array>(batch, "longitude")?;
    let retrieved_at = column::<TimestampMillisecondArray>(batch, "retrieved_at")?;
    let observed_at = column::<TimestampMillisecondArray>(batch, "observed_at")?;
    let station_name = column::<StringArray>(batch, "station_name")?;
    let country = column::<StringArray>(batch, "country")?;
    let temperature = column::<Float64Array>(batch, "temperature")?;
    let feels_like = column::<Float64Array>(batch, "feels_like")?;
    let temp_min = column::<Float64Array>(batch, "temp_min")?;
    let temp_max = column::<Float64Array>(batch, "temp_max")?;
    let humidity = column::<Float64Array>(batch, "humidity")?;
    let pressure = column::<Float64Array>(batch, "pressure")?;
    let wind_speed = column::<Float64Array>(batch, "wind_speed")?;
    let wind_deg = column::<Float64Array>(batch, "wind_deg")?;
    let wind_gust = column::<Float64Array>(batch, "wind_gust")?;
    let cloudiness = column::<Float64Array>(batch, "cloudiness")?;
    let visibility = column::<Float64Array>(batch, "visibility")?;
    let weather_condition = column::<StringArray>(batch, "weather_condition")?;
    let weather_description = column::<StringArray>(batch, "weather_description")?;
    let raw_payload = column::<StringArray>(batch, "raw_payload")?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(WeatherRow {
                latitude: latitude.value(i),
                longitude: longitude.value(i),
                retrieved_at: timestamp(retrieved_at.value(i))?,
                observed_at: opt_value(observed_at, i).map(timestamp).transpose()?,
                station_name: opt_string(station_name, i),
                country: opt_string(country, i),
                temperature: temperature.value(i),
                feels_like: opt_value(feels_like, i),
                temp_min: opt_value(temp_min, i),
                temp_max: opt_value(temp_max, i),
                humidity: humidity.value(i),
                pressure: pressure.value(i),
                wind_speed: wind_speed.value(i),
                wind_deg: opt_value(wind_deg, i),
                wind_gust: opt_value(wind_gust, i),
                cloudiness: opt_value(cloudiness, i),
                visibility: opt_value(visibility, i),
                weather_condition: weather_condition.value(i).to_string(),
                weather_description: opt_string(weather_description, i),
                raw_payload: opt_string(raw_payload, i),
            })
        })
        .collect()
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub file_size: u64,
    pub compression: Option<Compression>,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        let compression = self
            .compression
            .map(|c| format!("{:?}", c))
            .unwrap_or_else(|| "n/a".to_string());

        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.1} KB\n\
            - Compression: {}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            compression
        )
    }
}
