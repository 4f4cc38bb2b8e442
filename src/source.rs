//! Retrieval of source rasters into a work area

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Something that can place source raster bytes at a local path
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Writes the referenced raster to `dest`, returning the byte count
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<u64>;
}

/// Streams rasters over HTTP(S), typically from a pre-signed URL
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Creates a source whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl RasterSource for HttpSource {
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<u64> {
        let url = reqwest::Url::parse(reference)
            .map_err(|e| Error::Acquisition(format!("Invalid source URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Acquisition(format!(
                "Unsupported source URL scheme '{}'",
                url.scheme()
            )));
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Acquisition(format!("Failed to download source image: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Acquisition(format!(
                "Source download returned status {}",
                status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Acquisition(format!("Source download interrupted: {}", e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(Error::Acquisition("Source image is empty".to_string()));
        }

        debug!("downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}

/// Copies rasters from the local filesystem; references are paths
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSource;

#[async_trait]
impl RasterSource for LocalSource {
    async fn fetch(&self, reference: &str, dest: &Path) -> Result<u64> {
        let written = tokio::fs::copy(reference, dest).await.map_err(|e| {
            Error::Acquisition(format!("Failed to read source image {}: {}", reference, e))
        })?;

        if written == 0 {
            return Err(Error::Acquisition("Source image is empty".to_string()));
        }
        Ok(written)
    }
}
