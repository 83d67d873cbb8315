use crate::config::EvidenceConfig;
use crate::error::Error;
use anyhow::Result;
use log::{debug, error, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Result of [`EvidenceFiles::write`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// URL the image is served under
    pub url: String,
    /// `false` when the file was already on disk and left as is
    pub created: bool,
}

/// On-disk store for evidence images.
///
/// File names derive from `(alert_id, sequence_index)` only. The first write
/// of a name wins; a retried upload of the same tick leaves it untouched.
#[derive(Debug, Clone)]
pub struct EvidenceFiles {
    root: PathBuf,
    url_prefix: String,
}

impl EvidenceFiles {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(config.storage_path.clone(), &config.url_prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn file_name(alert_id: i64, sequence_index: i32) -> String {
        format!("evidence_{}_{}.jpg", alert_id, sequence_index)
    }

    /// Write an image unless its file already exists.
    pub async fn write(&self, alert_id: i64, sequence_index: i32, bytes: &[u8]) -> Result<StoredFile> {
        let file_name = Self::file_name(alert_id, sequence_index);
        let path = self.root.join(&file_name);
        let url = format!("{}/{}", self.url_prefix, file_name);

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::Storage(format!(
                "Failed to create evidence directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Evidence file {} already stored, keeping it", path.display());
                return Ok(StoredFile { url, created: false });
            }
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to create evidence file {}: {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            // A torn file would shadow every retry
            let _ = tokio::fs::remove_file(&path).await;
            return Err(Error::Storage(format!(
                "Failed to write evidence file {}: {}",
                path.display(),
                e
            ))
            .into());
        }

        Ok(StoredFile { url, created: true })
    }

    /// Map a stored `image_url` back to its file under the root directory.
    /// Only the final path component is honoured.
    pub fn path_for_url(&self, image_url: &str) -> Option<PathBuf> {
        Path::new(image_url)
            .file_name()
            .map(|name| self.root.join(name))
    }

    /// Remove the file behind an `image_url`. A file that is already gone
    /// counts as removed.
    pub async fn remove(&self, image_url: &str) -> Result<()> {
        let Some(path) = self.path_for_url(image_url) else {
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted evidence image: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Error deleting evidence image {}: {}", path.display(), e);
                Err(Error::Storage(format!("Failed to delete {}: {}", path.display(), e)).into())
            }
        }
    }
}
