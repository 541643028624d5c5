//! REST client for Supabase-compatible object storage

use super::{ObjectStore, UploadOptions};
use crate::error::{MediaWorkerError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client for the `/storage/v1` API
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base_url: Url,
    service_key: String,
    client: Client,
}

impl SupabaseStorage {
    /// Create a new storage client
    ///
    /// # Arguments
    /// * `base_url` - Project URL, e.g. `https://xyz.supabase.co`
    /// * `service_key` - Service-role key used for both `apikey` and bearer auth
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MediaWorkerError::StorageError(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            base_url,
            service_key: service_key.to_string(),
            client,
        })
    }

    /// Build `<base>/storage/v1/object[/public]/<bucket>/<path...>` with each segment encoded
    fn object_url(&self, public: bool, bucket: &str, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                MediaWorkerError::StorageError(format!("Invalid storage base URL: {}", self.base_url))
            })?;
            segments.pop_if_empty().extend(["storage", "v1", "object"]);
            if public {
                segments.push("public");
            }
            segments.push(bucket);
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn download(&self, bucket: &str, path: &str) -> Result<Option<Bytes>> {
        let url = self.object_url(false, bucket, path)?;
        debug!("Downloading {}/{}", bucket, path);

        let response = self
            .client
            .get(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| MediaWorkerError::StorageError(format!("Download of {} failed: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // Storage reports missing objects as 400 with a not_found body
            if status == StatusCode::BAD_REQUEST && error_text.contains("not_found") {
                return Ok(None);
            }
            return Err(MediaWorkerError::StorageError(format!(
                "Download of {} failed with status {}: {}",
                path, status, error_text
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MediaWorkerError::StorageError(format!("Failed to read {}: {}", path, e)))?;

        Ok(Some(body))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        let url = self.object_url(false, bucket, path)?;
        debug!("Uploading {} bytes to {}/{}", body.len(), bucket, path);

        let mut request = self
            .client
            .post(url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, &options.content_type)
            .header("x-upsert", if options.upsert { "true" } else { "false" });
        if let Some(cache_control) = &options.cache_control {
            request = request.header(reqwest::header::CACHE_CONTROL, cache_control);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| MediaWorkerError::StorageError(format!("Upload of {} failed: {}", path, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MediaWorkerError::StorageError(format!(
                "Upload of {} failed with status {}: {}",
                path, status, error_text
            )));
        }

        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        match self.object_url(true, bucket, path) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/storage/v1/object/public/{}/{}",
                self.base_url.as_str().trim_end_matches('/'),
                bucket,
                path
            ),
        }
    }
}
