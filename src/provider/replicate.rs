//! Replicate predictions provider (SDXL)

use super::{GeneratedMedia, GenerationRequest, MediaProvider, REPLICATE_SDXL_PROVIDER_ID};
use crate::db::MediaType;
use crate::error::{MediaWorkerError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Replicate API base URL
pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";

/// stability-ai/sdxl model version
pub const SDXL_VERSION: &str = "39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictionUrls {
    get: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// First output URL; SDXL returns an array of URLs, some models a bare string
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(url) => Some(url.clone()),
            Value::Array(urls) => urls.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Replicate HTTP client
pub struct ReplicateProvider {
    client: Client,
    api_token: String,
    version: String,
    poll_interval: Duration,
}

impl ReplicateProvider {
    pub fn new(api_token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| MediaWorkerError::FetchError {
                url: "client_init".to_string(),
                source: e,
            })?;

        Ok(Self {
            client,
            api_token: api_token.to_string(),
            version: SDXL_VERSION.to_string(),
            poll_interval: Duration::from_secs(1),
        })
    }

    fn provider_error(&self, message: String) -> MediaWorkerError {
        MediaWorkerError::ProviderError {
            provider: REPLICATE_SDXL_PROVIDER_ID.to_string(),
            message,
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Prediction> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| self.provider_error(format!("{} failed: {}", what, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.provider_error(format!(
                "{} failed with status {}: {}",
                what, status, error_text
            )));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| self.provider_error(format!("Failed to parse {} response: {}", what, e)))
    }
}

#[async_trait]
impl MediaProvider for ReplicateProvider {
    fn id(&self) -> &str {
        REPLICATE_SDXL_PROVIDER_ID
    }

    fn is_enabled(&self) -> bool {
        !self.api_token.is_empty()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedMedia> {
        if request.media_type != MediaType::Image {
            return Err(self.provider_error(format!(
                "cannot generate {}",
                request.media_type.as_str()
            )));
        }

        let body = PredictionRequest {
            version: &self.version,
            input: json!({ "prompt": request.prompt }),
        };
        let create = self
            .client
            .post(format!("{}/predictions", DEFAULT_API_BASE))
            .header("Prefer", "wait")
            .json(&body);
        let mut prediction = self.send_json(create, "Create prediction").await?;
        info!("Replicate prediction {} is {}", prediction.id, prediction.status);

        // Bounded overall by the worker's provider deadline
        while !prediction.is_terminal() {
            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|u| u.get.clone())
                .unwrap_or_else(|| format!("{}/predictions/{}", DEFAULT_API_BASE, prediction.id));

            sleep(self.poll_interval).await;
            prediction = self
                .send_json(self.client.get(&poll_url), "Poll prediction")
                .await?;
            debug!("Replicate prediction {} is {}", prediction.id, prediction.status);
        }

        if prediction.status != "succeeded" {
            let reason = prediction
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| prediction.status.clone());
            return Err(self.provider_error(format!(
                "Prediction {} ended as {}: {}",
                prediction.id, prediction.status, reason
            )));
        }

        let url = prediction
            .output_url()
            .ok_or_else(|| self.provider_error(format!("Prediction {} has no output", prediction.id)))?;

        Ok(GeneratedMedia {
            url,
            metadata: json!({
                "prediction_id": prediction.id,
                "version": self.version,
            }),
        })
    }
}
