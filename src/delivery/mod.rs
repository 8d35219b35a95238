pub mod blob_store;
pub mod local_store;

pub use blob_store::BlobStorageClient;
pub use local_store::LocalDirectoryStore;

use crate::utils::constants::PARQUET_CONTENT_TYPE;
use crate::utils::retry::RetryPolicy;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

/// A serialized run output ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryArtifact {
    pub object_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

impl DeliveryArtifact {
    pub fn parquet(object_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            object_name: object_name.into(),
            content,
            content_type: PARQUET_CONTENT_TYPE.to_string(),
        }
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    Auth,
    Network,
    Quota,
    Rejected,
}

impl DeliveryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Quota => "quota",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} delivery failure: {message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a non-success response from the store
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => DeliveryErrorKind::Auth,
            413 | 507 => DeliveryErrorKind::Quota,
            408 | 429 | 500..=599 => DeliveryErrorKind::Network,
            _ => DeliveryErrorKind::Rejected,
        };
        Self::new(kind, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == DeliveryErrorKind::Network
    }
}

/// Destination for run artifacts.
///
/// A successful upload means the whole object is durably stored under
/// `artifact.object_name`; uploading the same name again replaces it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, storage_url: &str, artifact: &DeliveryArtifact)
        -> Result<(), DeliveryError>;
}

/// Upload with retry on network failures. Returns the number of attempts made.
pub async fn deliver(
    store: &dyn ObjectStore,
    storage_url: &str,
    artifact: &DeliveryArtifact,
    retry: &RetryPolicy,
) -> Result<u32, DeliveryError> {
    let mut attempt = 0;

    loop {
        attempt += 1;
        match store.upload(storage_url, artifact).await {
            Ok(()) => {
                info!(
                    object = %artifact.object_name,
                    bytes = artifact.size(),
                    attempts = attempt,
                    "Artifact delivered"
                );
                return Ok(attempt);
            }
            Err(e) if e.is_retryable() && attempt <= retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt - 1);
                warn!(
                    object = %artifact.object_name,
                    attempt,
                    "Upload failed ({}), retrying in {:?}",
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
