use crate::delivery::{DeliveryArtifact, DeliveryError, DeliveryErrorKind, ObjectStore};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Delivers artifacts into a local directory.
///
/// The artifact is written to a temporary file in the target directory and
/// renamed into place, so readers never see a partial object. The storage URL
/// is ignored.
#[derive(Debug, Clone)]
pub struct LocalDirectoryStore {
    root: PathBuf,
}

impl LocalDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, object_name: &str) -> PathBuf {
        self.root.join(object_name)
    }
}

fn write_atomically(root: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(root)?;

    let mut temp = NamedTempFile::new_in(root)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;

    Ok(())
}

#[async_trait]
impl ObjectStore for LocalDirectoryStore {
    async fn upload(&self, _storage_url: &str, artifact: &DeliveryArtifact) -> Result<(), DeliveryError> {
        if artifact.object_name.contains(['/', '\\']) {
            return Err(DeliveryError::new(
                DeliveryErrorKind::Rejected,
                format!("object name must not contain a path: {}", artifact.object_name),
            ));
        }

        let root = self.root.clone();
        let target = self.object_path(&artifact.object_name);
        let content = artifact.content.clone();

        // Disk writes and fsync stay off the async workers
        let written = {
            let target = target.clone();
            tokio::task::spawn_blocking(move || write_atomically(&root, &target, &content))
                .await
                .map_err(|e| {
                    DeliveryError::new(DeliveryErrorKind::Rejected, format!("write task failed: {}", e))
                })?
        };

        written.map_err(|e| {
            let kind = match e.kind() {
                std::io::ErrorKind::PermissionDenied => DeliveryErrorKind::Auth,
                _ => DeliveryErrorKind::Rejected,
            };
            DeliveryError::new(kind, format!("{}: {}", self.root.display(), e))
        })?;

        debug!(path = %target.display(), "Artifact written");
        Ok(())
    }
}
