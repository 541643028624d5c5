//! Database models matching the media_jobs schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Media Jobs
// ============================================================================

/// MediaJob - Matches media_jobs table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaJob {
    pub id: Uuid,
    pub course_id: String,
    pub item_id: Option<i64>,
    pub media_type: String,
    pub prompt: String,
    pub provider: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub status: String,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MediaJob {
    /// Build a fresh pending job (used by enqueue tooling and tests)
    pub fn pending(course_id: &str, item_id: Option<i64>, media_type: &str, prompt: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            course_id: course_id.to_string(),
            item_id,
            media_type: media_type.to_string(),
            prompt: prompt.to_string(),
            provider: None,
            metadata: None,
            status: JobStatus::Pending.as_str().to_string(),
            result_url: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Look up a key in the job's metadata map
    pub fn metadata_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "audio" => Ok(MediaType::Audio),
            "video" => Ok(MediaType::Video),
            other => Err(other.to_string()),
        }
    }
}

/// Partial update for a media job row. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    /// Patch marking a job as successfully completed
    pub fn done(result_url: String, metadata: serde_json::Value) -> Self {
        Self {
            status: Some(JobStatus::Done),
            result_url: Some(result_url),
            metadata: Some(metadata),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Patch marking a job as failed
    pub fn failed(error: String) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error),
            completed_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Patch used by the fallback claim path
    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Apply this patch to an in-memory row
    pub fn apply_to(&self, job: &mut MediaJob) {
        if let Some(status) = self.status {
            job.status = status.as_str().to_string();
        }
        if let Some(url) = &self.result_url {
            job.result_url = Some(url.clone());
        }
        if let Some(error) = &self.error {
            job.error = Some(error.clone());
        }
        if let Some(metadata) = &self.metadata {
            job.metadata = Some(metadata.clone());
        }
        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            job.completed_at = Some(completed_at);
        }
        job.updated_at = Utc::now();
    }
}
