//! Supabase Storage REST backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{BlobStore, StorageError};
use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Bucket-scoped client for the Supabase Storage API
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| Error::Config("Service key is not a valid header value".to_string()))?;
        let apikey = HeaderValue::from_str(&config.service_key)
            .map_err(|_| Error::Config("Service key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create storage client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/storage/v1", config.url.trim_end_matches('/')),
            bucket: config.bucket.clone(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/object/{}/{}", self.base_url, self.bucket, path)
    }

    fn sign_url(&self, path: &str) -> String {
        format!("{}/object/sign/{}/{}", self.base_url, self.bucket, path)
    }

    /// Signed paths come back relative to `/storage/v1`
    fn absolute_signed_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/{}", self.base_url, signed.trim_start_matches('/'))
        }
    }
}

async fn check_status(
    response: reqwest::Response,
    path: &str,
) -> std::result::Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(path.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl BlobStore for SupabaseStore {
    async fn remove(&self, path: &str) -> std::result::Result<(), StorageError> {
        let response = self
            .client
            .delete(format!("{}/object/{}", self.base_url, self.bucket))
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;
        check_status(response, path).await?;
        Ok(())
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> std::result::Result<(), StorageError> {
        let response = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        check_status(response, path).await?;
        Ok(())
    }

    async fn create_signed_url(
        &self,
        path: &str,
        ttl: Duration,
    ) -> std::result::Result<String, StorageError> {
        let response = self
            .client
            .post(self.sign_url(path))
            .json(&json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;
        let signed: SignedUrlResponse = check_status(response, path).await?.json().await?;
        Ok(self.absolute_signed_url(&signed.signed_url))
    }
}
