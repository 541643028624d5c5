//! Error types for media-worker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaWorkerError {
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid target reference: {0}")]
    InvalidTarget(String),

    #[error("Target not found in course {course_id}: {detail}")]
    TargetNotFound { course_id: String, detail: String },

    #[error("Unknown media provider: {0}")]
    ProviderNotFound(String),

    #[error("Media provider is disabled: {0}")]
    ProviderDisabled(String),

    #[error("Provider {provider} failed: {message}")]
    ProviderError { provider: String, message: String },

    #[error("Provider {provider} timed out after {secs}s")]
    ProviderTimeout { provider: String, secs: u64 },

    #[error("Failed to fetch URL: {url}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for URL: {url}")]
    HttpStatusError { url: String, status: u16 },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Course document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid course document: {0}")]
    InvalidDocument(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Atomic claim function claim_next_media_job() is not installed and fallback claiming is disabled")]
    AtomicClaimUnavailable,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OpenAI API error: {0}")]
    OpenAiError(#[from] async_openai::error::OpenAIError),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl MediaWorkerError {
    /// Coarse failure category, recorded alongside the job error
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType(_) | Self::InvalidTarget(_) => "validation",
            Self::ProviderNotFound(_)
            | Self::ProviderDisabled(_)
            | Self::ProviderError { .. }
            | Self::ProviderTimeout { .. }
            | Self::OpenAiError(_) => "provider",
            Self::FetchError { .. } | Self::HttpStatusError { .. } => "fetch",
            Self::StorageError(_) | Self::UrlParseError(_) => "storage",
            Self::TargetNotFound { .. }
            | Self::DocumentNotFound(_)
            | Self::InvalidDocument(_)
            | Self::SerializationError(_) => "document",
            Self::DatabaseError(_) | Self::AtomicClaimUnavailable => "database",
            Self::ConfigError(_) => "config",
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaWorkerError>;
