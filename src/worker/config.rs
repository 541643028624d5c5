//! Worker configuration

use std::time::Duration;

/// Smallest batch a single invocation processes
pub const MIN_BATCH_SIZE: usize = 1;

/// Largest batch a single invocation processes
pub const MAX_BATCH_SIZE: usize = 25;

/// Clamp a requested batch size into `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`
pub fn clamp_batch_size(requested: i64) -> usize {
    requested.clamp(MIN_BATCH_SIZE as i64, MAX_BATCH_SIZE as i64) as usize
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval when the queue is empty (polling mode only)
    pub poll_interval: Duration,

    /// Jobs per batch when the caller does not say
    pub batch_size: usize,

    /// Deadline for one provider call
    pub provider_timeout: Duration,

    /// Fail jobs whose item/section/marker no longer exists instead of marking them done
    pub strict_targets: bool,

    /// Bucket holding `courses/<courseId>/course.json`
    pub content_bucket: String,

    /// Bucket receiving generated artifacts
    pub media_bucket: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 5,
            provider_timeout: Duration::from_secs(120), // 2 minutes
            strict_targets: false,
            content_bucket: "course-content".to_string(),
            media_bucket: "course-media".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Start a builder from this config, for command-line overrides
    pub fn into_builder(self) -> WorkerConfigBuilder {
        WorkerConfigBuilder { config: self }
    }
}

/// Builder for WorkerConfig
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    /// Set default batch size (clamped)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = clamp_batch_size(size as i64);
        self
    }

    /// Set provider call deadline
    pub fn provider_timeout(mut self, duration: Duration) -> Self {
        self.config.provider_timeout = duration;
        self
    }

    pub fn strict_targets(mut self, strict: bool) -> Self {
        self.config.strict_targets = strict;
        self
    }

    pub fn content_bucket(mut self, bucket: &str) -> Self {
        self.config.content_bucket = bucket.to_string();
        self
    }

    pub fn media_bucket(mut self, bucket: &str) -> Self {
        self.config.media_bucket = bucket.to_string();
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
