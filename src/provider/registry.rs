//! Provider lookup and selection

use super::MediaProvider;
use crate::db::MediaJob;
use crate::error::{MediaWorkerError, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// SDXL on Replicate; what the legacy `replicate` hint maps to
pub const REPLICATE_SDXL_PROVIDER_ID: &str = "replicate-sdxl";

/// OpenAI Images; what the legacy `openai` hint maps to
pub const OPENAI_IMAGE_PROVIDER_ID: &str = "openai-image";

/// Used when a job names no provider at all
pub const DEFAULT_PROVIDER_ID: &str = OPENAI_IMAGE_PROVIDER_ID;

/// Pick the provider id for a job.
///
/// Precedence: non-empty `metadata.provider_id`, then the legacy `provider` column, then the
/// default. An unrecognised legacy value is passed through as an id so lookup reports it
/// instead of quietly substituting another provider.
pub fn resolve_provider_id(job: &MediaJob) -> String {
    if let Some(id) = job
        .metadata_field("provider_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return id.to_string();
    }

    match job.provider.as_deref().map(str::trim) {
        Some("replicate") => REPLICATE_SDXL_PROVIDER_ID.to_string(),
        Some("openai") => OPENAI_IMAGE_PROVIDER_ID.to_string(),
        Some(other) if !other.is_empty() => other.to_string(),
        _ => DEFAULT_PROVIDER_ID.to_string(),
    }
}

/// Providers keyed by id, plus the administratively disabled set
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn MediaProvider>>,
    disabled: HashSet<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn MediaProvider>) -> &mut Self {
        self.providers.insert(provider.id().to_string(), provider);
        self
    }

    /// Mark a provider id as disabled
    pub fn disable(&mut self, provider_id: &str) -> &mut Self {
        self.disabled.insert(provider_id.to_string());
        self
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Look up a provider; never falls back to a different one
    pub fn get(&self, provider_id: &str) -> Result<Arc<dyn MediaProvider>> {
        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| MediaWorkerError::ProviderNotFound(provider_id.to_string()))?;

        if self.disabled.contains(provider_id) || !provider.is_enabled() {
            return Err(MediaWorkerError::ProviderDisabled(provider_id.to_string()));
        }

        Ok(Arc::clone(provider))
    }
}
