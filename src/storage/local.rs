//! Directory-backed store for offline runs and tests

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::debug;

use super::{BlobStore, StorageError};

/// Stores objects as files under a root directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Resolves an object key, refusing keys that climb out of the root
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StorageError::Request(format!("Invalid object path '{}'", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("storing {} ({}, {} bytes)", file.display(), content_type, bytes.len());
        tokio::fs::write(&file, bytes).await?;
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let file = self.resolve(path)?;
        if !tokio::fs::try_exists(&file).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let absolute = tokio::fs::canonicalize(&file).await?;
        let expires = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(ttl)
            .as_secs();

        Ok(format!("file://{}?expires={}", absolute.display(), expires))
    }
}
