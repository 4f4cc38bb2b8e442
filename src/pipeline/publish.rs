//! Publication of a validated artifact to blob storage

use std::path::Path;
use std::time::Duration;

use log::debug;

use crate::bounds::GeoBounds;
use crate::error::{Error, Result};
use crate::storage::BlobStore;

/// What the caller gets back after a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedArtifact {
    pub signed_url: String,
    pub object_path: String,
    pub bounds: GeoBounds,
}

/// Replaces the object at `object_path` with `artifact` and signs it.
///
/// Removing the previous object is best effort. Upload and signing
/// failures are `Publication` errors.
pub async fn publish(
    store: &dyn BlobStore,
    object_path: &str,
    artifact: &Path,
    content_type: &str,
    ttl: Duration,
    bounds: GeoBounds,
) -> Result<PublishedArtifact> {
    let bytes = tokio::fs::read(artifact).await?;

    if let Err(e) = store.remove(object_path).await {
        debug!("ignoring removal failure for {}: {}", object_path, e);
    }

    let size = bytes.len();
    store
        .upload(object_path, bytes, content_type)
        .await
        .map_err(|e| Error::Publication(format!("Upload to {} failed: {}", object_path, e)))?;
    debug!("uploaded {} bytes to {}", size, object_path);

    let signed_url = store
        .create_signed_url(object_path, ttl)
        .await
        .map_err(|e| Error::Publication(format!("Signing {} failed: {}", object_path, e)))?;

    Ok(PublishedArtifact {
        signed_url,
        object_path: object_path.to_string(),
        bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::GeoTransform;
    use crate::storage::{LocalStore, StorageError};
    use crate::types::Dimensions;
    use async_trait::async_trait;

    fn bounds() -> GeoBounds {
        GeoBounds::from_transform(
            &GeoTransform::north_up(10.0, 50.0, 0.01, -0.01),
            Dimensions::new(100, 100),
        )
        .unwrap()
    }

    struct FailingStore {
        fail_upload: bool,
    }

    #[async_trait]
    impl BlobStore for FailingStore {
        async fn remove(&self, path: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::NotFound(path.to_string()))
        }

        async fn upload(
            &self,
            _: &str,
            _: Vec<u8>,
            _: &str,
        ) -> std::result::Result<(), StorageError> {
            if self.fail_upload {
                Err(StorageError::Status { status: 500, body: "boom".into() })
            } else {
                Ok(())
            }
        }

        async fn create_signed_url(
            &self,
            _: &str,
            _: Duration,
        ) -> std::result::Result<String, StorageError> {
            Err(StorageError::Request("sign refused".into()))
        }
    }

    #[tokio::test]
    async fn test_publish_to_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("display.png");
        std::fs::write(&artifact, b"png bytes").unwrap();
        let store = LocalStore::new(dir.path().join("store"));

        let published = publish(
            &store,
            "georef/p1.png",
            &artifact,
            "image/png",
            Duration::from_secs(300),
            bounds(),
        )
        .await
        .unwrap();

        assert_eq!(published.object_path, "georef/p1.png");
        assert!(published.signed_url.contains("georef/p1.png"));
        assert_eq!(published.bounds, bounds());
    }

    #[tokio::test]
    async fn test_upload_failure_is_publication_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("display.png");
        std::fs::write(&artifact, b"png bytes").unwrap();

        let err = publish(
            &FailingStore { fail_upload: true },
            "georef/p1.png",
            &artifact,
            "image/png",
            Duration::from_secs(300),
            bounds(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Publication(_)));
    }

    #[tokio::test]
    async fn test_sign_failure_is_publication_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("display.png");
        std::fs::write(&artifact, b"png bytes").unwrap();

        let err = publish(
            &FailingStore { fail_upload: false },
            "georef/p1.png",
            &artifact,
            "image/png",
            Duration::from_secs(300),
            bounds(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Publication(_)));
    }
}
