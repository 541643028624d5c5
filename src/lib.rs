//! Media Worker - generates media for queued course jobs and attaches it to course documents
//!
//! Each job is claimed from the `media_jobs` queue, sent to a generation provider, copied
//! into the media bucket, and linked into the course's JSON document:
//! - item jobs set the quiz item's `stimulus` image
//! - study text jobs replace an `[IMAGE:...]` marker in the section content
//!
//! The worker runs behind an HTTP gate (`serve`), as a one-shot batch (`run`), or as a
//! polling loop (`worker`).

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod ingest;
pub mod provider;
pub mod server;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod worker;

pub use config::{AppConfig, StatusPolicy};
pub use error::{MediaWorkerError, Result};
pub use worker::{BatchReport, JobProcessor, JobResult, JobRunner, TargetRef, WorkerConfig};

use crate::db::{create_pool, PgJobStore};
use crate::document::DocumentMutator;
use crate::ingest::{ArtifactIngestor, ArtifactSource, HttpArtifactSource};
use crate::provider::{OpenAiImageProvider, ProviderRegistry, ReplicateProvider};
use crate::storage::{ObjectStore, SupabaseStorage};
use std::sync::Arc;
use tracing::info;

/// Register every provider whose credentials are configured, then apply the disable list
pub fn build_provider_registry(config: &AppConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    if let Some(key) = &config.openai_api_key {
        registry.register(Arc::new(OpenAiImageProvider::new(
            key,
            provider::openai::DEFAULT_IMAGE_MODEL,
        )));
    }
    if let Some(token) = &config.replicate_api_token {
        registry.register(Arc::new(ReplicateProvider::new(token)?));
    }
    for id in &config.disabled_providers {
        registry.disable(id);
    }

    info!("Media providers: {:?}", registry.ids());
    Ok(registry)
}

/// Wire a processor over arbitrary storage and artifact sources
pub fn build_processor(
    config: &WorkerConfig,
    providers: Arc<ProviderRegistry>,
    source: Arc<dyn ArtifactSource>,
    store: Arc<dyn ObjectStore>,
) -> JobProcessor {
    let ingestor = ArtifactIngestor::new(source, Arc::clone(&store), &config.media_bucket);
    let mutator = DocumentMutator::new(store, &config.content_bucket);
    JobProcessor::new(config.clone(), providers, ingestor, mutator)
}

/// Connect to Postgres and storage and build a ready runner.
///
/// Fails when `claim_next_media_job()` is missing and the fallback claim is not allowed.
pub async fn build_runner(config: &AppConfig) -> Result<JobRunner> {
    let pool = create_pool(config).await?;

    let store = Arc::new(PgJobStore::new(pool, config.allow_fallback_claim));
    store.verify_atomic_claim().await?;

    let storage: Arc<dyn ObjectStore> = Arc::new(SupabaseStorage::new(
        &config.storage_url,
        &config.storage_service_key,
    )?);
    let source: Arc<dyn ArtifactSource> =
        Arc::new(HttpArtifactSource::new(config.worker.provider_timeout)?);
    let providers = Arc::new(build_provider_registry(config)?);

    let processor = build_processor(&config.worker, providers, source, storage);
    Ok(JobRunner::new(store, config.worker.clone(), processor))
}
