//! Blob storage for published rasters

pub mod local;
pub mod supabase;

use std::time::Duration;

use async_trait::async_trait;

use crate::types::RasterFormat;

pub use local::LocalStore;
pub use supabase::SupabaseStore;

/// Failure reported by a storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),

    #[error("storage request failed: {0}")]
    Request(String),

    #[error("storage returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Request(e.to_string())
    }
}

/// Object storage with overwrite semantics and signed retrieval links
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Deletes an object; callers treat failure as benign
    async fn remove(&self, path: &str) -> Result<(), StorageError>;

    /// Stores `bytes` at `path`
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Issues a credential-free URL valid for `ttl`
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Deterministic object key for a project's published raster
pub fn object_path(prefix: &str, project_id: &str, format: RasterFormat) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}.{}", project_id, format.extension())
    } else {
        format!("{}/{}.{}", prefix, project_id, format.extension())
    }
}
