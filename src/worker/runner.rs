//! Job runner - batch processing and the polling worker loop

use crate::db::{JobPatch, JobStatus, JobStore, MediaJob};
use crate::error::Result;
use crate::worker::config::clamp_batch_size;
use crate::worker::{JobProcessor, WorkerConfig};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one job in a batch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub results: Vec<JobResult>,
}

/// Claims jobs and drives each through the processor
pub struct JobRunner {
    store: Arc<dyn JobStore>,
    config: WorkerConfig,
    processor: JobProcessor,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    /// Create a new job runner
    pub fn new(store: Arc<dyn JobStore>, config: WorkerConfig, processor: JobProcessor) -> Self {
        Self {
            store,
            config,
            processor,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Get a handle to signal shutdown
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Claim and process up to `requested` jobs (clamped to 1..=25).
    ///
    /// Jobs are processed one after another. A failing job is recorded as `failed` and the
    /// batch moves on; only a claim error on the very first claim is returned as an error.
    pub async fn run_batch(&self, requested: i64) -> Result<BatchReport> {
        let limit = clamp_batch_size(requested);
        let mut report = BatchReport::default();

        while report.results.len() < limit {
            let job = match self.store.claim_next_pending().await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) if report.results.is_empty() => return Err(e),
                Err(e) => {
                    error!("Claim failed mid-batch, stopping early: {}", e);
                    break;
                }
            };

            let result = self.process_job(job).await;
            report.results.push(result);
        }

        report.processed = report.results.len();
        Ok(report)
    }

    /// Process one claimed job and record its terminal state
    async fn process_job(&self, job: MediaJob) -> JobResult {
        let job_id = job.id;
        info!(job_id = %job_id, course_id = %job.course_id, "Claimed media job");

        match self.processor.process(&job).await {
            Ok(processed) => {
                info!(
                    job_id = %job_id,
                    url = %processed.result_url,
                    attach = processed.outcome.as_str(),
                    "Media job done"
                );
                let patch = JobPatch::done(processed.result_url.clone(), processed.metadata);
                if let Err(e) = self.store.update_job(job_id, &patch).await {
                    error!(job_id = %job_id, "Failed to mark job done: {}", e);
                }
                JobResult {
                    id: job_id,
                    status: JobStatus::Done,
                    result_url: Some(processed.result_url),
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job_id = %job_id, category = e.category(), "Media job failed: {}", message);
                let patch = JobPatch::failed(message.clone());
                if let Err(e) = self.store.update_job(job_id, &patch).await {
                    error!(job_id = %job_id, "Failed to mark job failed: {}", e);
                }
                JobResult {
                    id: job_id,
                    status: JobStatus::Failed,
                    result_url: None,
                    error: Some(message),
                }
            }
        }
    }

    /// Main worker loop
    ///
    /// Runs batches until shutdown is signaled, sleeping when the queue is empty
    pub async fn run(&self) -> Result<()> {
        info!("Starting media worker...");
        info!("Poll interval: {:?}", self.config.poll_interval);
        info!("Batch size: {}", self.config.batch_size);
        info!("Provider timeout: {:?}", self.config.provider_timeout);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received, stopping worker...");
                break;
            }

            match self.run_batch(self.config.batch_size as i64).await {
                Ok(report) if report.processed > 0 => {
                    info!("Batch processed {} jobs, checking for more...", report.processed);
                }
                Ok(_) => {
                    info!("No pending jobs, sleeping for {:?}", self.config.poll_interval);
                    sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    // Wait a bit before retrying after error
                    sleep(Duration::from_secs(10)).await;
                }
            }
        }

        info!("Worker stopped");
        Ok(())
    }
}

/// Setup signal handlers for graceful shutdown
pub fn setup_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });
}
