//! Process configuration read from the environment

use crate::error::{MediaWorkerError, Result};
use crate::worker::WorkerConfig;
use std::time::Duration;

/// How the HTTP gate reports failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Always HTTP 200; success or failure is carried by the `ok` flag
    #[default]
    Structured,
    /// Honest status codes (401, 405) with the same JSON body
    Strict,
}

impl std::str::FromStr for StatusPolicy {
    type Err = MediaWorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(StatusPolicy::Structured),
            "strict" => Ok(StatusPolicy::Strict),
            other => Err(MediaWorkerError::ConfigError(format!(
                "HTTP_STATUS_POLICY must be 'structured' or 'strict', got '{}'",
                other
            ))),
        }
    }
}

/// Everything needed to wire the worker together
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub storage_url: String,
    pub storage_service_key: String,
    pub agent_token: String,
    pub openai_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
    pub disabled_providers: Vec<String>,
    pub allow_fallback_claim: bool,
    pub status_policy: StatusPolicy,
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Read configuration from environment variables (call `dotenvy::dotenv()` first)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| MediaWorkerError::ConfigError(format!("{} not set", key)))
        };

        let defaults = WorkerConfig::default();
        let mut worker = WorkerConfig::builder()
            .strict_targets(parse_bool(get("STRICT_TARGETS").as_deref(), false)?)
            .content_bucket(
                get("CONTENT_BUCKET")
                    .as_deref()
                    .unwrap_or(defaults.content_bucket.as_str()),
            )
            .media_bucket(
                get("MEDIA_BUCKET")
                    .as_deref()
                    .unwrap_or(defaults.media_bucket.as_str()),
            );

        if let Some(secs) = get("PROVIDER_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                MediaWorkerError::ConfigError(format!("PROVIDER_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            worker = worker.provider_timeout(Duration::from_secs(secs));
        }

        let disabled_providers = get("DISABLED_MEDIA_PROVIDERS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            storage_url: require("STORAGE_URL")?,
            storage_service_key: require("STORAGE_SERVICE_KEY")?,
            agent_token: require("AGENT_TOKEN")?,
            openai_api_key: get("OPENAI_API_KEY"),
            replicate_api_token: get("REPLICATE_API_TOKEN"),
            disabled_providers,
            allow_fallback_claim: parse_bool(get("ALLOW_FALLBACK_CLAIM").as_deref(), false)?,
            status_policy: get("HTTP_STATUS_POLICY")
                .map(|v| v.parse::<StatusPolicy>())
                .transpose()?
                .unwrap_or_default(),
            worker: worker.build(),
        })
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> Result<bool> {
    match value.map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(MediaWorkerError::ConfigError(format!(
                "expected a boolean, got '{}'",
                other
            ))),
        },
    }
}
