//! Shared wiring for integration tests: a runner over in-memory stores

#![allow(dead_code)]

use chrono::{Duration as ChronoDuration, Utc};
use media_worker::db::MediaJob;
use media_worker::provider::{ProviderRegistry, DEFAULT_PROVIDER_ID};
use media_worker::testing::{MemoryJobStore, MemoryObjectStore, StaticArtifactSource, StaticProvider};
use media_worker::{build_processor, JobRunner, WorkerConfig};
use serde_json::Value;
use std::sync::Arc;

pub const CONTENT_BUCKET: &str = "course-content";
pub const MEDIA_BUCKET: &str = "course-media";
pub const GENERATED_URL: &str = "https://gen.test/output.png";

pub struct Harness {
    pub jobs: Arc<MemoryJobStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub source: Arc<StaticArtifactSource>,
    pub provider: Arc<StaticProvider>,
    pub runner: JobRunner,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            StaticProvider::new(DEFAULT_PROVIDER_ID, GENERATED_URL),
            StaticArtifactSource::png(),
            WorkerConfig::default(),
        )
    }

    pub fn with(provider: StaticProvider, source: StaticArtifactSource, config: WorkerConfig) -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let source = Arc::new(source);
        let provider = Arc::new(provider);

        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());

        let processor = build_processor(
            &config,
            Arc::new(registry),
            source.clone(),
            objects.clone(),
        );
        let runner = JobRunner::new(jobs.clone(), config, processor);

        Self {
            jobs,
            objects,
            source,
            provider,
            runner,
        }
    }

    pub fn seed_course(&self, course_id: &str, document: &Value) {
        self.objects.put_json(CONTENT_BUCKET, &document_path(course_id), document);
    }

    pub fn course(&self, course_id: &str) -> Value {
        self.objects
            .json(CONTENT_BUCKET, &document_path(course_id))
            .unwrap_or(Value::Null)
    }

    /// Enqueue a job, `age_secs` seconds old (older jobs are claimed first)
    pub async fn enqueue(&self, mut job: MediaJob, age_secs: i64) -> uuid::Uuid {
        job.created_at = Utc::now() - ChronoDuration::seconds(age_secs);
        self.jobs.insert(job).await
    }
}

pub fn document_path(course_id: &str) -> String {
    format!("courses/{}/course.json", course_id)
}

pub fn image_job(course_id: &str, item_id: Option<i64>, metadata: Value) -> MediaJob {
    let mut job = MediaJob::pending(course_id, item_id, "image", "A labelled diagram of a cell");
    job.metadata = Some(metadata);
    job
}

/// `[IMAGE:<url>]` as written into study text content
pub fn marker(url: &str) -> String {
    format!("[IMAGE:{}]", url)
}
