//! OpenAI Images provider

use super::{GeneratedMedia, GenerationRequest, MediaProvider, OPENAI_IMAGE_PROVIDER_ID};
use crate::db::MediaType;
use crate::error::{MediaWorkerError, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

/// Default image model
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// OpenAI image generation client
pub struct OpenAiImageProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiImageProvider {
    /// Create a new provider
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "dall-e-3")
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// Create provider from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| MediaWorkerError::ConfigError("OPENAI_API_KEY not set".to_string()))?;

        Ok(Self::new(&api_key, DEFAULT_IMAGE_MODEL))
    }

    fn image_model(&self) -> ImageModel {
        match self.model.as_str() {
            "dall-e-2" => ImageModel::DallE2,
            "dall-e-3" => ImageModel::DallE3,
            other => ImageModel::Other(other.to_string()),
        }
    }
}

#[async_trait]
impl MediaProvider for OpenAiImageProvider {
    fn id(&self) -> &str {
        OPENAI_IMAGE_PROVIDER_ID
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMedia> {
        if request.media_type != MediaType::Image {
            return Err(MediaWorkerError::ProviderError {
                provider: self.id().to_string(),
                message: format!("cannot generate {}", request.media_type.as_str()),
            });
        }

        debug!("Requesting image from {} ({} chars of prompt)", self.model, request.prompt.len());

        let image_request = CreateImageRequestArgs::default()
            .prompt(request.prompt.clone())
            .model(self.image_model())
            .response_format(ImageResponseFormat::Url)
            .size(ImageSize::S1024x1024)
            .build()?;

        let response = self.client.images().create(image_request).await?;

        let image = response.data.first().ok_or_else(|| MediaWorkerError::ProviderError {
            provider: self.id().to_string(),
            message: "Empty image response".to_string(),
        })?;

        let image: &Image = image;
        match image {
            Image::Url {
                url,
                revised_prompt,
            } => Ok(GeneratedMedia {
                url: url.clone(),
                metadata: json!({
                    "model": self.model,
                    "revised_prompt": revised_prompt,
                    "created": response.created,
                }),
            }),
            Image::B64Json { .. } => Err(MediaWorkerError::ProviderError {
                provider: self.id().to_string(),
                message: "Expected a URL response, got inline base64".to_string(),
            }),
        }
    }
}
