//! Target references: where in a course document a generated artifact belongs

use crate::db::MediaJob;
use crate::error::{MediaWorkerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Location inside a course document that receives the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetRef {
    /// Visual stimulus of one quiz item
    ItemStimulus {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "itemId")]
        item_id: u64,
    },
    /// Inline `[IMAGE:...]` marker inside one study text section
    StudyText {
        #[serde(rename = "courseId")]
        course_id: String,
        #[serde(rename = "sectionId")]
        section_id: String,
        #[serde(rename = "markerIndex", skip_serializing_if = "Option::is_none")]
        marker_index: Option<usize>,
    },
}

impl TargetRef {
    pub fn course_id(&self) -> &str {
        match self {
            TargetRef::ItemStimulus { course_id, .. } | TargetRef::StudyText { course_id, .. } => {
                course_id
            }
        }
    }

    /// Storage prefix under `courses/<courseId>/`
    pub fn path_prefix(&self) -> String {
        match self {
            TargetRef::ItemStimulus { item_id, .. } => format!("items/{}", item_id),
            TargetRef::StudyText { section_id, .. } => format!("study-texts/{}", section_id),
        }
    }
}

/// Resolve the target for a job.
///
/// An explicit `metadata.targetRef` wins and must be well-formed; a malformed one fails the
/// job rather than being coerced. Without one the job's own `itemId` is used.
pub fn resolve_target(job: &MediaJob) -> Result<TargetRef> {
    match job.metadata_field("targetRef") {
        None | Some(Value::Null) => default_item_target(job),
        Some(Value::Object(obj)) => {
            let course_id = obj
                .get("courseId")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(job.course_id.as_str())
                .to_string();

            match obj.get("type").or_else(|| obj.get("kind")).and_then(Value::as_str) {
                Some("study_text") => {
                    let section_id = obj
                        .get("sectionId")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .ok_or_else(|| {
                            MediaWorkerError::InvalidTarget(
                                "study_text target requires a non-empty sectionId".to_string(),
                            )
                        })?;

                    let marker_index = match obj.get("markerIndex") {
                        Some(v) => parse_marker_index(v)?,
                        None => match job.metadata_field("markerIndex") {
                            Some(v) => parse_marker_index(v)?,
                            None => None,
                        },
                    };

                    Ok(TargetRef::StudyText {
                        course_id,
                        section_id: section_id.to_string(),
                        marker_index,
                    })
                }
                Some("item_stimulus") => {
                    let item_id = obj.get("itemId").ok_or_else(|| {
                        MediaWorkerError::InvalidTarget(
                            "item_stimulus target requires an itemId".to_string(),
                        )
                    })?;
                    Ok(TargetRef::ItemStimulus {
                        course_id,
                        item_id: parse_item_id(item_id)?,
                    })
                }
                Some(other) => Err(MediaWorkerError::InvalidTarget(format!(
                    "unknown target type '{}'",
                    other
                ))),
                None => Err(MediaWorkerError::InvalidTarget(
                    "targetRef is missing its type".to_string(),
                )),
            }
        }
        Some(other) => Err(MediaWorkerError::InvalidTarget(format!(
            "targetRef must be an object, got {}",
            other
        ))),
    }
}

fn default_item_target(job: &MediaJob) -> Result<TargetRef> {
    match job.item_id {
        Some(item_id) if item_id >= 0 => Ok(TargetRef::ItemStimulus {
            course_id: job.course_id.clone(),
            item_id: item_id as u64,
        }),
        Some(item_id) => Err(MediaWorkerError::InvalidTarget(format!(
            "itemId must be non-negative, got {}",
            item_id
        ))),
        None => Err(MediaWorkerError::InvalidTarget(
            "job has neither a targetRef nor an itemId".to_string(),
        )),
    }
}

/// Accept integral, finite, non-negative numbers (also as numeric strings)
fn parse_item_id(value: &Value) -> Result<u64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => Ok(n as u64),
        _ => Err(MediaWorkerError::InvalidTarget(format!(
            "itemId must be a finite non-negative integer, got {}",
            value
        ))),
    }
}

fn parse_marker_index(value: &Value) -> Result<Option<usize>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
            _ => Err(MediaWorkerError::InvalidTarget(format!(
                "markerIndex must be a non-negative integer, got {}",
                n
            ))),
        },
        other => Err(MediaWorkerError::InvalidTarget(format!(
            "markerIndex must be a number, got {}",
            other
        ))),
    }
}
