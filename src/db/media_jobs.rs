//! Media jobs database operations

use crate::db::models::{JobPatch, MediaJob};
use crate::db::DbPool;
use crate::error::Result;
use sqlx::Row;
use uuid::Uuid;

/// Postgres SQLSTATE for `undefined_function`
const UNDEFINED_FUNCTION: &str = "42883";

/// Atomically claim the next pending job through `claim_next_media_job()`.
///
/// The function selects the oldest pending row with `FOR UPDATE SKIP LOCKED` and flips it to
/// `processing` in the same statement, so concurrent workers never receive the same row.
pub async fn claim_next_pending_job(pool: &DbPool) -> Result<Option<MediaJob>> {
    let job = sqlx::query_as::<_, MediaJob>("SELECT * FROM claim_next_media_job()")
        .fetch_optional(pool)
        .await?;

    // The function returns SETOF media_jobs: an empty queue yields zero rows.
    Ok(job)
}

/// Fetch the oldest pending job without claiming it.
///
/// Only used by the fallback claim path. Two workers can both observe the same row here
/// before either of them marks it `processing`.
pub async fn fetch_oldest_pending_job(pool: &DbPool) -> Result<Option<MediaJob>> {
    let job = sqlx::query_as::<_, MediaJob>(
        r#"
        SELECT * FROM media_jobs
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    Ok(job)
}

/// Mark a job `processing` if it is still pending.
///
/// Returns false when another worker got there first.
pub async fn mark_processing(pool: &DbPool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE media_jobs
        SET status = 'processing',
            started_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
          AND status = 'pending'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Merge the patch's fields into the job row
pub async fn update_job(pool: &DbPool, job_id: Uuid, patch: &JobPatch) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE media_jobs
        SET status = COALESCE($2, status),
            result_url = COALESCE($3, result_url),
            error = COALESCE($4, error),
            metadata = COALESCE($5, metadata),
            started_at = COALESCE($6, started_at),
            completed_at = COALESCE($7, completed_at),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(patch.status.map(|s| s.as_str()))
    .bind(&patch.result_url)
    .bind(&patch.error)
    .bind(&patch.metadata)
    .bind(patch.started_at)
    .bind(patch.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job_by_id(pool: &DbPool, job_id: Uuid) -> Result<Option<MediaJob>> {
    let job = sqlx::query_as::<_, MediaJob>("SELECT * FROM media_jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    Ok(job)
}

/// Count pending jobs for monitoring
pub async fn count_pending_jobs(pool: &DbPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM media_jobs WHERE status = 'pending'")
        .fetch_one(pool)
        .await?;

    Ok(row.get("count"))
}

/// Whether `claim_next_media_job()` is installed in the connected database
pub async fn atomic_claim_installed(pool: &DbPool) -> Result<bool> {
    let row = sqlx::query("SELECT to_regproc('claim_next_media_job') IS NOT NULL AS installed")
        .fetch_one(pool)
        .await?;

    Ok(row.get("installed"))
}

/// True when the error means the atomic claim function does not exist
pub fn is_undefined_function(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_FUNCTION),
        _ => false,
    }
}
