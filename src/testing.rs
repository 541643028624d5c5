//! In-memory implementations of the worker's boundaries
//!
//! Used by unit tests and the integration tests under `tests/`. Nothing here talks to a
//! database, a bucket or a provider.

use crate::db::{JobPatch, JobStatus, JobStore, MediaJob};
use crate::error::{MediaWorkerError, Result};
use crate::ingest::{ArtifactSource, FetchedArtifact};
use crate::provider::{GeneratedMedia, GenerationRequest, MediaProvider};
use crate::storage::{ObjectStore, UploadOptions};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Job queue held in memory. Claims take a single lock, so they never overlap.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Vec<MediaJob>>,
    patches: Mutex<Vec<(Uuid, JobPatch)>>,
    fail_claims: AtomicBool,
    claims_before_failure: StdMutex<Option<usize>>,
    fail_updates: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job; it keeps whatever status it was built with
    pub async fn insert(&self, job: MediaJob) -> Uuid {
        let id = job.id;
        self.jobs.lock().await.push(job);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<MediaJob> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn jobs(&self) -> Vec<MediaJob> {
        self.jobs.lock().await.clone()
    }

    /// Every patch applied so far, in order
    pub async fn patches(&self) -> Vec<(Uuid, JobPatch)> {
        self.patches.lock().await.clone()
    }

    /// Make every subsequent claim fail with a database-style error
    pub fn fail_claims(&self, fail: bool) {
        self.fail_claims.store(fail, Ordering::Relaxed);
    }

    /// Let the next `claims` claims through, then fail every later one
    pub fn fail_claims_after(&self, claims: usize) {
        if let Ok(mut remaining) = self.claims_before_failure.lock() {
            *remaining = Some(claims);
        }
    }

    /// Make every subsequent status update fail; the job row stays as it was
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::Relaxed);
    }

    fn claim_allowed(&self) -> bool {
        if self.fail_claims.load(Ordering::Relaxed) {
            return false;
        }
        match self.claims_before_failure.lock() {
            Ok(mut remaining) => match remaining.as_mut() {
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
                None => true,
            },
            Err(_) => false,
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim_next_pending(&self) -> Result<Option<MediaJob>> {
        if !self.claim_allowed() {
            return Err(MediaWorkerError::DatabaseError(sqlx::Error::PoolTimedOut));
        }

        let mut jobs = self.jobs.lock().await;
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending.as_str())
            .min_by_key(|j| j.created_at);

        Ok(next.map(|job| {
            JobPatch::processing().apply_to(job);
            job.clone()
        }))
    }

    async fn update_job(&self, job_id: Uuid, patch: &JobPatch) -> Result<()> {
        if self.fail_updates.load(Ordering::Relaxed) {
            return Err(MediaWorkerError::DatabaseError(sqlx::Error::PoolClosed));
        }
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            patch.apply_to(job);
        }
        self.patches.lock().await.push((job_id, patch.clone()));
        Ok(())
    }

    async fn count_pending(&self) -> Result<i64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .filter(|j| j.status == JobStatus::Pending.as_str())
            .count() as i64)
    }
}

/// A stored object with the options it was uploaded with
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub options: UploadOptions,
}

/// Bucket storage held in memory
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: StdMutex<HashMap<(String, String), StoredObject>>,
    uploads: StdMutex<Vec<(String, String)>>,
    rejected_buckets: StdMutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub const PUBLIC_BASE: &'static str = "https://storage.test";

    pub fn new() -> Self {
        Self::default()
    }

    /// Seed raw bytes without counting them as an upload
    pub fn put(&self, bucket: &str, path: &str, body: impl Into<Bytes>) {
        let object = StoredObject {
            body: body.into(),
            options: UploadOptions::json_document(),
        };
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert((bucket.to_string(), path.to_string()), object);
        }
    }

    /// Seed a JSON document, serialized pretty like the authoring side writes it
    pub fn put_json(&self, bucket: &str, path: &str, value: &Value) {
        let body = serde_json::to_vec_pretty(value).unwrap_or_default();
        self.put(bucket, path, body);
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn bytes(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.object(bucket, path).map(|o| o.body)
    }

    /// Parse a stored object as JSON
    pub fn json(&self, bucket: &str, path: &str) -> Option<Value> {
        let body = self.bytes(bucket, path)?;
        serde_json::from_slice(&body).ok()
    }

    /// Refuse every later upload into `bucket`
    pub fn reject_uploads_to(&self, bucket: &str) {
        if let Ok(mut rejected) = self.rejected_buckets.lock() {
            rejected.push(bucket.to_string());
        }
    }

    /// `(bucket, path)` of every upload, in order
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Paths uploaded into one bucket
    pub fn uploads_to(&self, bucket: &str) -> Vec<String> {
        self.uploads()
            .into_iter()
            .filter(|(b, _)| b == bucket)
            .map(|(_, path)| path)
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, bucket: &str, path: &str) -> Result<Option<Bytes>> {
        Ok(self.bytes(bucket, path))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        body: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        let rejected = self
            .rejected_buckets
            .lock()
            .map(|r| r.iter().any(|b| b == bucket))
            .unwrap_or(false);
        if rejected {
            return Err(MediaWorkerError::StorageError(format!(
                "upload to {}/{} rejected: bucket is read-only",
                bucket, path
            )));
        }

        let key = (bucket.to_string(), path.to_string());
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| MediaWorkerError::StorageError("object map poisoned".to_string()))?;

        if !options.upsert && objects.contains_key(&key) {
            return Err(MediaWorkerError::StorageError(format!(
                "{}/{} already exists",
                bucket, path
            )));
        }

        objects.insert(
            key.clone(),
            StoredObject {
                body,
                options: options.clone(),
            },
        );
        drop(objects);

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(key);
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{}/{}", Self::PUBLIC_BASE, bucket, path)
    }
}

/// Provider that answers with a fixed URL, optionally after a delay or with an error
pub struct StaticProvider {
    id: String,
    url: String,
    enabled: bool,
    delay: Option<Duration>,
    error: Option<String>,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            enabled: true,
            delay: None,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider whose every call fails with `message`
    pub fn failing(id: &str, message: &str) -> Self {
        let mut provider = Self::new(id, "");
        provider.error = Some(message.to_string());
        provider
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProvider for StaticProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(MediaWorkerError::ProviderError {
                provider: self.id.clone(),
                message: message.clone(),
            });
        }

        Ok(GeneratedMedia {
            url: self.url.clone(),
            metadata: json!({
                "static": true,
                "prompt": request.prompt,
                "generated_at": Utc::now().to_rfc3339(),
            }),
        })
    }
}

/// Artifact source returning fixed bytes, or a fixed HTTP error status
pub struct StaticArtifactSource {
    bytes: Bytes,
    content_type: String,
    status: Option<u16>,
    fetched: StdMutex<Vec<String>>,
}

impl StaticArtifactSource {
    pub fn new(bytes: impl Into<Bytes>, content_type: &str) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.to_string(),
            status: None,
            fetched: StdMutex::new(Vec::new()),
        }
    }

    /// A PNG-typed source with a few placeholder bytes
    pub fn png() -> Self {
        Self::new(Bytes::from_static(b"\x89PNG\r\n\x1a\nfake"), "image/png")
    }

    /// Every fetch fails with this HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// URLs fetched so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactSource for StaticArtifactSource {
    async fn fetch(&self, url: &str) -> Result<FetchedArtifact> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }
        if let Some(status) = self.status {
            return Err(MediaWorkerError::HttpStatusError {
                url: url.to_string(),
                status,
            });
        }
        Ok(FetchedArtifact {
            bytes: self.bytes.clone(),
            content_type: self.content_type.clone(),
        })
    }
}
