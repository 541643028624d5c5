//! Job store abstraction and the Postgres-backed claim protocol

use crate::db::media_jobs;
use crate::db::models::{JobPatch, MediaJob};
use crate::db::DbPool;
use crate::error::{MediaWorkerError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on fallback-path retries after losing a claim race
const MAX_FALLBACK_ATTEMPTS: usize = 3;

/// Queue operations the job runner depends on
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Claim the next pending job, transitioning it to `processing`
    async fn claim_next_pending(&self) -> Result<Option<MediaJob>>;

    /// Merge fields into a job row
    async fn update_job(&self, job_id: Uuid, patch: &JobPatch) -> Result<()>;

    /// Number of jobs still waiting to be claimed
    async fn count_pending(&self) -> Result<i64>;
}

/// Postgres job store
///
/// Claiming prefers `claim_next_media_job()`. When that function is missing the store can
/// fall back to select-then-update, which is NOT safe under concurrent invocations: two
/// workers may select the same row. The guarded update narrows the window (only one of them
/// flips `pending -> processing`) but this path is best effort and must not be relied on
/// for exactly-once claiming.
pub struct PgJobStore {
    pool: DbPool,
    allow_fallback: bool,
    atomic_missing: AtomicBool,
}

impl PgJobStore {
    /// Create a new store
    pub fn new(pool: DbPool, allow_fallback: bool) -> Self {
        Self {
            pool,
            allow_fallback,
            atomic_missing: AtomicBool::new(false),
        }
    }

    /// Check the atomic claim function at startup.
    ///
    /// Errors with `AtomicClaimUnavailable` when it is missing and fallback is not allowed,
    /// so the process refuses to start instead of silently degrading.
    pub async fn verify_atomic_claim(&self) -> Result<()> {
        if media_jobs::atomic_claim_installed(&self.pool).await? {
            return Ok(());
        }

        self.atomic_missing.store(true, Ordering::Relaxed);
        if self.allow_fallback {
            warn!(
                "claim_next_media_job() is not installed; using non-atomic fallback claiming. \
                 Concurrent workers may claim the same job."
            );
            Ok(())
        } else {
            Err(MediaWorkerError::AtomicClaimUnavailable)
        }
    }

    async fn claim_with_fallback(&self) -> Result<Option<MediaJob>> {
        for attempt in 1..=MAX_FALLBACK_ATTEMPTS {
            let job = match media_jobs::fetch_oldest_pending_job(&self.pool).await? {
                Some(job) => job,
                None => return Ok(None),
            };

            if media_jobs::mark_processing(&self.pool, job.id).await? {
                let mut job = job;
                JobPatch::processing().apply_to(&mut job);
                return Ok(Some(job));
            }

            debug!(
                job_id = %job.id,
                attempt,
                "Lost fallback claim race, trying next pending job"
            );
        }

        Ok(None)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn claim_next_pending(&self) -> Result<Option<MediaJob>> {
        if !self.atomic_missing.load(Ordering::Relaxed) {
            match media_jobs::claim_next_pending_job(&self.pool).await {
                Ok(job) => return Ok(job),
                Err(MediaWorkerError::DatabaseError(e)) if media_jobs::is_undefined_function(&e) => {
                    self.atomic_missing.store(true, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        if !self.allow_fallback {
            return Err(MediaWorkerError::AtomicClaimUnavailable);
        }

        warn!("Claiming via non-atomic fallback path");
        self.claim_with_fallback().await
    }

    async fn update_job(&self, job_id: Uuid, patch: &JobPatch) -> Result<()> {
        media_jobs::update_job(&self.pool, job_id, patch).await
    }

    async fn count_pending(&self) -> Result<i64> {
        media_jobs::count_pending_jobs(&self.pool).await
    }
}
