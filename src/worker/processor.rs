//! Job processor for handling individual media jobs

use crate::db::{MediaJob, MediaType};
use crate::document::{AttachOutcome, DocumentMutator};
use crate::error::{MediaWorkerError, Result};
use crate::ingest::ArtifactIngestor;
use crate::provider::{resolve_provider_id, GenerationRequest, ProviderRegistry};
use crate::worker::target::{resolve_target, TargetRef};
use crate::worker::WorkerConfig;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Successful processing result
#[derive(Debug, Clone)]
pub struct ProcessedJob {
    pub result_url: String,
    /// Job metadata merged with provider, storage and attach details
    pub metadata: Value,
    pub outcome: AttachOutcome,
}

/// Generates, stores and attaches the artifact for one job
pub struct JobProcessor {
    config: WorkerConfig,
    providers: Arc<ProviderRegistry>,
    ingestor: ArtifactIngestor,
    mutator: DocumentMutator,
}

impl JobProcessor {
    /// Create a new job processor
    pub fn new(
        config: WorkerConfig,
        providers: Arc<ProviderRegistry>,
        ingestor: ArtifactIngestor,
        mutator: DocumentMutator,
    ) -> Self {
        Self {
            config,
            providers,
            ingestor,
            mutator,
        }
    }

    /// Validate the job before any I/O
    pub fn validate(job: &MediaJob) -> Result<(MediaType, TargetRef)> {
        let media_type = job
            .media_type
            .parse::<MediaType>()
            .map_err(MediaWorkerError::UnsupportedMediaType)?;
        if media_type != MediaType::Image {
            return Err(MediaWorkerError::UnsupportedMediaType(
                media_type.as_str().to_string(),
            ));
        }

        let target = resolve_target(job)?;
        Ok((media_type, target))
    }

    /// Process a single media job
    pub async fn process(&self, job: &MediaJob) -> Result<ProcessedJob> {
        // Step 1: Validate media type and target
        let (media_type, target) = Self::validate(job)?;

        // Step 2: Resolve provider
        let provider_id = resolve_provider_id(job);
        let provider = self.providers.get(&provider_id)?;
        info!(job_id = %job.id, provider = %provider_id, "Generating {}", media_type.as_str());

        // Step 3: Generate with a deadline
        let request = GenerationRequest {
            media_type,
            prompt: job.prompt.clone(),
            target: target.clone(),
        };
        let generated = tokio::time::timeout(self.config.provider_timeout, provider.generate(&request))
            .await
            .map_err(|_| MediaWorkerError::ProviderTimeout {
                provider: provider_id.clone(),
                secs: self.config.provider_timeout.as_secs(),
            })??;

        // Step 4: Fetch and store the artifact
        let artifact = self.ingestor.ingest(&generated.url).await?;
        let stored = self
            .ingestor
            .store(target.course_id(), &target.path_prefix(), artifact)
            .await?;

        // Step 5: Attach to the course document
        let outcome = match &target {
            TargetRef::ItemStimulus { course_id, item_id } => {
                self.mutator
                    .attach_to_item(course_id, *item_id, &stored.public_url)
                    .await?
            }
            TargetRef::StudyText {
                course_id,
                section_id,
                marker_index,
            } => {
                self.mutator
                    .attach_to_study_text(course_id, section_id, &stored.public_url, *marker_index)
                    .await?
            }
        };

        if outcome != AttachOutcome::Attached {
            if self.config.strict_targets {
                return Err(MediaWorkerError::TargetNotFound {
                    course_id: target.course_id().to_string(),
                    detail: format!("{} for {}", outcome.as_str(), target.path_prefix()),
                });
            }
            warn!(
                job_id = %job.id,
                outcome = outcome.as_str(),
                "Artifact stored but not attached; job will still be marked done"
            );
        }

        let metadata = merge_metadata(
            job.metadata.as_ref(),
            json!({
                "provider_id": provider_id,
                "provider_metadata": generated.metadata,
                "storage_path": stored.path,
                "target": target,
                "attach": outcome.as_str(),
            }),
        );

        Ok(ProcessedJob {
            result_url: stored.public_url,
            metadata,
            outcome,
        })
    }
}

/// Shallow-merge `extra` over the job's existing metadata object
pub fn merge_metadata(existing: Option<&Value>, extra: Value) -> Value {
    let mut merged = match existing {
        Some(Value::Object(obj)) => obj.clone(),
        _ => Map::new(),
    };
    if let Value::Object(extra) = extra {
        for (key, value) in extra {
            merged.insert(key, value);
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_image() {
        let job = MediaJob::pending("c", Some(1), "audio", "a jingle");
        let err = JobProcessor::validate(&job).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported media type: audio");

        let job = MediaJob::pending("c", Some(1), "hologram", "?");
        assert!(matches!(
            JobProcessor::validate(&job),
            Err(MediaWorkerError::UnsupportedMediaType(t)) if t == "hologram"
        ));
    }

    #[test]
    fn test_validate_image_job() {
        let job = MediaJob::pending("c", Some(3), "image", "a cell");
        let (media_type, target) = JobProcessor::validate(&job).unwrap();
        assert_eq!(media_type, MediaType::Image);
        assert_eq!(target.path_prefix(), "items/3");
    }

    #[test]
    fn test_merge_metadata() {
        let existing = json!({"targetRef": {"type": "item_stimulus", "itemId": 1}, "attach": "old"});
        let merged = merge_metadata(Some(&existing), json!({"attach": "attached", "storage_path": "p"}));
        assert_eq!(merged["attach"], json!("attached"));
        assert_eq!(merged["storage_path"], json!("p"));
        assert_eq!(merged["targetRef"]["itemId"], json!(1));

        assert_eq!(merge_metadata(None, json!({"a": 1})), json!({"a": 1}));
    }
}
