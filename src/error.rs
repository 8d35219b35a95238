use crate::delivery::DeliveryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid location at index {index}: {message}")]
    InvalidLocation { index: usize, message: String },

    #[error("Secret '{name}' unavailable: {reason}")]
    SecretUnavailable { name: String, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No observations to combine: every location failed")]
    EmptyResult,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn secret_unavailable(name: &str, reason: impl Into<String>) -> Self {
        Self::SecretUnavailable {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
