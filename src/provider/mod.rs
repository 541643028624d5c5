//! Media generation providers
//!
//! The worker only sees the narrow [`MediaProvider`] interface; concrete providers wrap a
//! vendor API and return a URL to the generated content.

pub mod openai;
pub mod registry;
pub mod replicate;

use crate::db::MediaType;
use crate::error::Result;
use crate::worker::TargetRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiImageProvider;
pub use registry::{
    resolve_provider_id, ProviderRegistry, DEFAULT_PROVIDER_ID, OPENAI_IMAGE_PROVIDER_ID,
    REPLICATE_SDXL_PROVIDER_ID,
};
pub use replicate::ReplicateProvider;

/// Input to a generation call
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub media_type: MediaType,
    pub prompt: String,
    pub target: TargetRef,
}

/// Provider output: where to fetch the content, plus provider-specific details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMedia {
    pub url: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Registry identifier, e.g. `openai-image`
    fn id(&self) -> &str;

    /// Whether the provider is configured well enough to be called
    fn is_enabled(&self) -> bool {
        true
    }

    /// Generate media for the request
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMedia>;
}
