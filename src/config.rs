//! Layered run settings.
//!
//! Values come from an optional TOML file, then `WEATHER_PIPELINE__*`
//! environment variables (e.g. `WEATHER_PIPELINE__WEATHER__UNITS=metric`),
//! then serde defaults for anything left unset.

use crate::error::{PipelineError, Result};
use crate::fetch::Units;
use crate::secrets::SecretNames;
use crate::utils::constants::*;
use crate::utils::retry::RetryPolicy;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

const ENV_PREFIX: &str = "WEATHER_PIPELINE";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[serde(default = "default_locations_file")]
    pub locations_file: PathBuf,
    #[serde(default)]
    #[validate(nested)]
    pub secrets: SecretsSettings,
    #[serde(default)]
    #[validate(nested)]
    pub weather: WeatherSettings,
    #[serde(default)]
    #[validate(nested)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    #[validate(nested)]
    pub run: RunSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretProviderKind {
    /// `WEATHER_SECRET_*` environment variables
    #[default]
    Env,
    /// Azure Key Vault REST API
    KeyVault,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecretsSettings {
    #[serde(default)]
    pub provider: SecretProviderKind,
    #[serde(default = "default_api_key_name")]
    #[validate(length(min = 1))]
    pub api_key_name: String,
    #[serde(default = "default_storage_url_name")]
    #[validate(length(min = 1))]
    pub storage_url_name: String,
    /// Required when `provider = "key_vault"`
    #[serde(default)]
    pub vault_url: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WeatherSettings {
    #[serde(default = "default_weather_base_url")]
    #[validate(url)]
    pub base_url: String,
    #[serde(default)]
    pub units: Units,
    #[serde(default = "default_fetch_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub timeout_seconds: u64,
    #[serde(default = "default_fetch_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[serde(default = "default_fetch_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_fetch_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeliverySettings {
    #[serde(default = "default_container")]
    #[validate(length(min = 3, max = 63))]
    pub container: String,
    /// Non-empty means deliver into this local directory instead of blob storage
    #[serde(default)]
    pub output_dir: String,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_upload_timeout")]
    #[validate(range(min = 1, max = 3600))]
    pub timeout_seconds: u64,
    #[serde(default = "default_upload_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[serde(default = "default_upload_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_upload_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunSettings {
    #[serde(default = "default_slot_minutes")]
    #[validate(range(min = 1, max = 1440))]
    pub slot_minutes: u32,
    #[serde(default = "default_min_successful_locations")]
    #[validate(range(min = 1))]
    pub min_successful_locations: usize,
    #[serde(default)]
    pub retain_raw_payload: bool,
}

fn default_locations_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOCATIONS_FILE)
}

fn default_api_key_name() -> String {
    DEFAULT_API_KEY_SECRET.to_string()
}

fn default_storage_url_name() -> String {
    DEFAULT_STORAGE_URL_SECRET.to_string()
}

fn default_access_token_env() -> String {
    DEFAULT_KEYVAULT_TOKEN_ENV.to_string()
}

fn default_weather_base_url() -> String {
    DEFAULT_WEATHER_BASE_URL.to_string()
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_fetch_max_retries() -> u32 {
    DEFAULT_FETCH_MAX_RETRIES
}

fn default_fetch_initial_backoff() -> u64 {
    DEFAULT_FETCH_INITIAL_BACKOFF_MS
}

fn default_fetch_max_backoff() -> u64 {
    DEFAULT_FETCH_MAX_BACKOFF_MS
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_compression() -> String {
    COMPRESSION_SNAPPY.to_string()
}

fn default_upload_timeout() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT_SECS
}

fn default_upload_max_retries() -> u32 {
    DEFAULT_UPLOAD_MAX_RETRIES
}

fn default_upload_initial_backoff() -> u64 {
    DEFAULT_UPLOAD_INITIAL_BACKOFF_MS
}

fn default_upload_max_backoff() -> u64 {
    DEFAULT_UPLOAD_MAX_BACKOFF_MS
}

fn default_slot_minutes() -> u32 {
    DEFAULT_SLOT_MINUTES
}

fn default_min_successful_locations() -> usize {
    1
}

impl Default for SecretsSettings {
    fn default() -> Self {
        Self {
            provider: SecretProviderKind::default(),
            api_key_name: default_api_key_name(),
            storage_url_name: default_storage_url_name(),
            vault_url: String::new(),
            access_token_env: default_access_token_env(),
        }
    }
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            base_url: default_weather_base_url(),
            units: Units::default(),
            timeout_seconds: default_fetch_timeout(),
            max_retries: default_fetch_max_retries(),
            initial_backoff_ms: default_fetch_initial_backoff(),
            max_backoff_ms: default_fetch_max_backoff(),
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            container: default_container(),
            output_dir: String::new(),
            compression: default_compression(),
            timeout_seconds: default_upload_timeout(),
            max_retries: default_upload_max_retries(),
            initial_backoff_ms: default_upload_initial_backoff(),
            max_backoff_ms: default_upload_max_backoff(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            slot_minutes: default_slot_minutes(),
            min_successful_locations: default_min_successful_locations(),
            retain_raw_payload: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locations_file: default_locations_file(),
            secrets: SecretsSettings::default(),
            weather: WeatherSettings::default(),
            delivery: DeliverySettings::default(),
            run: RunSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path` (or `weather-pipeline.toml` if present) and
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(PipelineError::Config(format!(
                        "Settings file not found: {}",
                        path.display()
                    )));
                }
                File::from(path).format(FileFormat::Toml).required(true)
            }
            None => File::with_name(DEFAULT_SETTINGS_FILE)
                .format(FileFormat::Toml)
                .required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(environment.separator(ENV_SEPARATOR).try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    /// Field validation plus rules that span fields
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if self.secrets.provider == SecretProviderKind::KeyVault && self.secrets.vault_url.is_empty()
        {
            return Err(PipelineError::Config(
                "secrets.vault_url is required for the key_vault provider".to_string(),
            ));
        }

        if !matches!(
            self.delivery.compression.to_lowercase().as_str(),
            COMPRESSION_SNAPPY | COMPRESSION_GZIP | COMPRESSION_LZ4 | COMPRESSION_ZSTD | COMPRESSION_NONE
        ) {
            return Err(PipelineError::Config(format!(
                "Unsupported compression: {}",
                self.delivery.compression
            )));
        }

        Ok(())
    }

    pub fn secret_names(&self) -> SecretNames {
        SecretNames {
            api_key: self.secrets.api_key_name.clone(),
            storage_url: self.secrets.storage_url_name.clone(),
        }
    }

    /// Local output directory, if delivery should bypass blob storage
    pub fn output_dir(&self) -> Option<PathBuf> {
        let dir = self.delivery.output_dir.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }
}

impl WeatherSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff_ms, self.max_backoff_ms)
    }
}

impl DeliverySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff_ms, self.max_backoff_ms)
    }
}
