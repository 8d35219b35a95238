use crate::delivery::{DeliveryArtifact, DeliveryError, DeliveryErrorKind, ObjectStore};
use crate::error::Result;
use crate::utils::constants::{BLOB_SERVICE_VERSION, DEFAULT_CONTAINER, DEFAULT_UPLOAD_TIMEOUT_SECS};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use quick_xml::de::from_str;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Error document returned by the storage service on a refused request
#[derive(Debug, Deserialize)]
struct StorageErrorBody {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

/// Error code from a storage error document, if the body is one
fn storage_error_code(body: &str) -> Option<String> {
    let error: StorageErrorBody = from_str(body.trim_start_matches('\u{feff}')).ok()?;
    if let Some(ref message) = error.message {
        debug!("Storage error message: {}", message.lines().next().unwrap_or_default());
    }
    error.code.filter(|code| !code.trim().is_empty())
}

/// Azure Blob Storage over the Put Blob REST call.
///
/// `storage_url` is the account endpoint, optionally carrying a SAS token as
/// its query string. The blob lands at `{storage_url}/{container}/{object_name}`
/// and an existing blob of that name is overwritten.
#[derive(Debug, Clone)]
pub struct BlobStorageClient {
    client: Client,
    container: String,
}

impl BlobStorageClient {
    pub fn new(container: &str) -> Result<Self> {
        Self::with_timeout(container, Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS))
    }

    pub fn with_timeout(container: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            container: container.to_string(),
        })
    }

    /// Resolve the blob URL, keeping any query string from the account URL
    pub fn blob_url(
        &self,
        storage_url: &str,
        object_name: &str,
    ) -> std::result::Result<Url, DeliveryError> {
        let mut url = Url::parse(storage_url).map_err(|e| {
            DeliveryError::new(DeliveryErrorKind::Rejected, format!("invalid storage URL: {}", e))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                DeliveryError::new(DeliveryErrorKind::Rejected, "storage URL cannot be a base")
            })?
            .pop_if_empty()
            .push(&self.container)
            .push(object_name);

        Ok(url)
    }
}

impl Default for BlobStorageClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
            container: DEFAULT_CONTAINER.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for BlobStorageClient {
    #[instrument(skip_all, fields(object = %artifact.object_name))]
    async fn upload(
        &self,
        storage_url: &str,
        artifact: &DeliveryArtifact,
    ) -> std::result::Result<(), DeliveryError> {
        let url = self.blob_url(storage_url, &artifact.object_name)?;
        // SAS tokens live in the query
        debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            bytes = artifact.size(),
            "Uploading blob"
        );

        let response = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", BLOB_SERVICE_VERSION)
            .header(CONTENT_TYPE, artifact.content_type.as_str())
            .body(artifact.content.clone())
            .send()
            .await
            .map_err(|e| DeliveryError::new(DeliveryErrorKind::Network, e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = match storage_error_code(&body) {
            Some(code) => format!("{} ({})", status, code),
            None => status.to_string(),
        };

        Err(DeliveryError::from_status(status.as_u16(), message))
    }
}
