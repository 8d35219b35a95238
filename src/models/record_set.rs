use super::Observation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column order of every artifact, independent of which locations succeeded.
pub const WEATHER_COLUMNS: [&str; 20] = [
    "latitude",
    "longitude",
    "retrieved_at",
    "observed_at",
    "station_name",
    "country",
    "temperature",
    "feels_like",
    "temp_min",
    "temp_max",
    "humidity",
    "pressure",
    "wind_speed",
    "wind_deg",
    "wind_gust",
    "cloudiness",
    "visibility",
    "weather_condition",
    "weather_description",
    "raw_payload",
];

/// One flattened row of the weather table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRow {
    pub latitude: f64,
    pub longitude: f64,
    pub retrieved_at: DateTime<Utc>,
    pub observed_at: Option<DateTime<Utc>>,
    pub station_name: Option<String>,
    pub country: Option<String>,
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_deg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub cloudiness: Option<f64>,
    pub visibility: Option<f64>,
    pub weather_condition: String,
    pub weather_description: Option<String>,
    pub raw_payload: Option<String>,
}

impl WeatherRow {
    pub fn from_observation(observation: &Observation, retain_raw_payload: bool) -> Self {
        Self {
            latitude: observation.location.latitude,
            longitude: observation.location.longitude,
            retrieved_at: observation.retrieved_at,
            observed_at: observation.observed_at,
            station_name: observation.station_name.clone(),
            country: observation.country.clone(),
            temperature: observation.temperature,
            feels_like: observation.feels_like,
            temp_min: observation.temp_min,
            temp_max: observation.temp_max,
            humidity: observation.humidity,
            pressure: observation.pressure,
            wind_speed: observation.wind_speed,
            wind_deg: observation.wind_deg,
            wind_gust: observation.wind_gust,
            cloudiness: observation.cloudiness,
            visibility: observation.visibility,
            weather_condition: observation.weather_condition.clone(),
            weather_description: observation.weather_description.clone(),
            raw_payload: retain_raw_payload.then(|| observation.raw_payload.clone()),
        }
    }
}

/// Row-per-observation table ready for serialization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    pub rows: Vec<WeatherRow>,
}

impl RecordSet {
    pub fn new(rows: Vec<WeatherRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
