//! Artifact ingestion: fetch provider output and persist it to object storage

use crate::error::{MediaWorkerError, Result};
use crate::storage::{ObjectStore, UploadOptions};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Bytes fetched from a provider URL
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub bytes: Bytes,
    pub content_type: String,
}

/// A stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: String,
    pub public_url: String,
}

/// Source of generated bytes
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedArtifact>;
}

/// Fetches artifacts over HTTP. A non-success status is a hard failure; there is no retry.
pub struct HttpArtifactSource {
    client: Client,
}

impl HttpArtifactSource {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()
            .map_err(|e| MediaWorkerError::FetchError {
                url: "client_init".to_string(),
                source: e,
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn fetch(&self, url: &str) -> Result<FetchedArtifact> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaWorkerError::FetchError {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaWorkerError::HttpStatusError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaWorkerError::FetchError {
                url: url.to_string(),
                source: e,
            })?;

        debug!("Fetched {} bytes ({}) from {}", bytes.len(), content_type, url);
        Ok(FetchedArtifact {
            bytes,
            content_type,
        })
    }
}

/// File extension for a content type. Best effort: no content sniffing.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let content_type = content_type.to_ascii_lowercase();
    if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("png") {
        "png"
    } else if content_type.contains("jpeg") || content_type.contains("jpg") {
        "jpg"
    } else {
        "bin"
    }
}

/// `courses/<courseId>/<prefix>/<fresh-id>.<ext>`
pub fn artifact_path(course_id: &str, path_prefix: &str, extension: &str) -> String {
    format!(
        "courses/{}/{}/{}.{}",
        course_id,
        path_prefix.trim_matches('/'),
        Uuid::new_v4(),
        extension
    )
}

/// Fetches provider output and uploads it to the media bucket
pub struct ArtifactIngestor {
    source: Arc<dyn ArtifactSource>,
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ArtifactIngestor {
    pub fn new(source: Arc<dyn ArtifactSource>, store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            source,
            store,
            bucket: bucket.to_string(),
        }
    }

    /// Fetch the bytes behind a provider URL
    pub async fn ingest(&self, source_url: &str) -> Result<FetchedArtifact> {
        self.source.fetch(source_url).await
    }

    /// Upload fetched bytes under a fresh path and return its public URL
    pub async fn store(
        &self,
        course_id: &str,
        path_prefix: &str,
        artifact: FetchedArtifact,
    ) -> Result<StoredArtifact> {
        let extension = extension_for_content_type(&artifact.content_type);
        let path = artifact_path(course_id, path_prefix, extension);

        self.store
            .upload(
                &self.bucket,
                &path,
                artifact.bytes,
                &UploadOptions::artifact(&artifact.content_type),
            )
            .await?;

        let public_url = self.store.public_url(&self.bucket, &path);
        info!(course_id, path = %path, "Stored artifact");

        Ok(StoredArtifact { path, public_url })
    }
}
