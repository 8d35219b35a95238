/// Secret names
pub const DEFAULT_API_KEY_SECRET: &str = "OpenWeatherApiKey";
pub const DEFAULT_STORAGE_URL_SECRET: &str = "AzureStorageUrl";
pub const ENV_SECRET_PREFIX: &str = "WEATHER_SECRET_";
pub const DEFAULT_KEYVAULT_TOKEN_ENV: &str = "AZURE_KEYVAULT_TOKEN";
pub const KEYVAULT_API_VERSION: &str = "7.4";

/// File names
pub const DEFAULT_SETTINGS_FILE: &str = "weather-pipeline.toml";
pub const DEFAULT_LOCATIONS_FILE: &str = "include/locations.json";

/// Weather API
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Delivery
pub const DEFAULT_CONTAINER: &str = "openweather";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;
pub const BLOB_SERVICE_VERSION: &str = "2021-08-06";
pub const OBJECT_NAME_PREFIX: &str = "weather_data_";
pub const OBJECT_NAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const PARQUET_EXTENSION: &str = "parquet";
pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

/// Retry defaults
pub const DEFAULT_FETCH_MAX_RETRIES: u32 = 3;
pub const DEFAULT_FETCH_INITIAL_BACKOFF_MS: u64 = 500;
pub const DEFAULT_FETCH_MAX_BACKOFF_MS: u64 = 8_000;
pub const DEFAULT_UPLOAD_MAX_RETRIES: u32 = 3;
pub const DEFAULT_UPLOAD_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_UPLOAD_MAX_BACKOFF_MS: u64 = 16_000;

/// Scheduling
pub const DEFAULT_SLOT_MINUTES: u32 = 60;
pub const MAX_SLOT_MINUTES: u32 = 1440;

/// Processing defaults
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
