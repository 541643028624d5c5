//! Read-modify-write patches of course documents
//!
//! Each operation downloads the whole document, edits one location and uploads the whole
//! document again. There is no optimistic-concurrency check: two jobs patching the same
//! course at the same time can lose one of the edits (last write wins).

use super::envelope::CourseDocument;
use super::markers::{place_image, MarkerEdit};
use crate::error::{MediaWorkerError, Result};
use crate::storage::{ObjectStore, UploadOptions};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage path of a course's content document
pub fn document_path(course_id: &str) -> String {
    format!("courses/{}/course.json", course_id)
}

/// What an attach operation did to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Document changed and was uploaded
    Attached,
    /// The item or section does not exist; document untouched
    TargetNotFound,
    /// The section exists but `markerIndex` is past its last marker; document untouched
    MarkerNotFound,
}

impl AttachOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachOutcome::Attached => "attached",
            AttachOutcome::TargetNotFound => "target_not_found",
            AttachOutcome::MarkerNotFound => "marker_not_found",
        }
    }
}

/// Alt text for an item stimulus
pub fn stimulus_alt(item_id: u64) -> String {
    format!("Illustration for item {}", item_id)
}

/// Replace the `stimulus` of the item whose `id` equals `item_id`.
///
/// Returns false when no such item exists.
pub fn set_item_stimulus(content: &mut Value, item_id: u64, url: &str) -> bool {
    let item = content
        .get_mut("items")
        .and_then(Value::as_array_mut)
        .and_then(|items| items.iter_mut().find(|item| id_matches(item.get("id"), item_id)));

    match item.and_then(Value::as_object_mut) {
        Some(item) => {
            item.insert(
                "stimulus".to_string(),
                json!({
                    "type": "image",
                    "url": url,
                    "alt": stimulus_alt(item_id),
                }),
            );
            true
        }
        None => false,
    }
}

/// Place an image marker into the section whose `id` equals `section_id`.
///
/// `None` when the section does not exist.
pub fn set_study_text_image(
    content: &mut Value,
    section_id: &str,
    url: &str,
    marker_index: Option<usize>,
) -> Option<MarkerEdit> {
    let section = content
        .get_mut("studyTexts")
        .and_then(Value::as_array_mut)?
        .iter_mut()
        .find(|section| section_id_matches(section.get("id"), section_id))?
        .as_object_mut()?;

    let current = section.get("content").and_then(Value::as_str).unwrap_or("");
    let edit = place_image(current, url, marker_index);
    if let Some(updated) = edit.content() {
        section.insert("content".to_string(), Value::String(updated.to_string()));
    }
    Some(edit)
}

fn id_matches(id: Option<&Value>, item_id: u64) -> bool {
    match id {
        Some(Value::Number(n)) => match n.as_u64() {
            Some(id) => id == item_id,
            // Integral floats such as `7.0` match only when they convert back exactly
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64 == item_id && (f as u64) as f64 == f)
                .unwrap_or(false),
        },
        Some(Value::String(s)) => s.trim() == item_id.to_string(),
        _ => false,
    }
}

fn section_id_matches(id: Option<&Value>, section_id: &str) -> bool {
    match id {
        Some(Value::String(s)) => s == section_id,
        Some(Value::Number(n)) => n.to_string() == section_id,
        _ => false,
    }
}

/// Applies attach operations against documents in object storage
pub struct DocumentMutator {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl DocumentMutator {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }

    /// Download and parse the current document for a course
    pub async fn load(&self, course_id: &str) -> Result<CourseDocument> {
        let path = document_path(course_id);
        let bytes = self
            .store
            .download(&self.bucket, &path)
            .await?
            .ok_or_else(|| MediaWorkerError::DocumentNotFound(format!("{}/{}", self.bucket, path)))?;

        let document = CourseDocument::parse(&bytes)?;
        debug!(
            course_id,
            format = ?document.format(),
            bytes = bytes.len(),
            "Loaded course document"
        );
        Ok(document)
    }

    async fn save(&self, course_id: &str, document: CourseDocument) -> Result<()> {
        let path = document_path(course_id);
        let body = Bytes::from(document.to_bytes()?);
        self.store
            .upload(&self.bucket, &path, body, &UploadOptions::json_document())
            .await
    }

    /// Set the image stimulus of one quiz item
    pub async fn attach_to_item(
        &self,
        course_id: &str,
        item_id: u64,
        url: &str,
    ) -> Result<AttachOutcome> {
        let mut document = self.load(course_id).await?;

        if !set_item_stimulus(document.content_mut(), item_id, url) {
            warn!(
                course_id,
                item_id, "Item not found in course document, leaving document untouched"
            );
            return Ok(AttachOutcome::TargetNotFound);
        }

        self.save(course_id, document).await?;
        info!(course_id, item_id, "Attached stimulus to item");
        Ok(AttachOutcome::Attached)
    }

    /// Replace (or append) an `[IMAGE:...]` marker in one study text section
    pub async fn attach_to_study_text(
        &self,
        course_id: &str,
        section_id: &str,
        url: &str,
        marker_index: Option<usize>,
    ) -> Result<AttachOutcome> {
        let mut document = self.load(course_id).await?;

        let edit = match set_study_text_image(document.content_mut(), section_id, url, marker_index)
        {
            Some(edit) => edit,
            None => {
                warn!(
                    course_id,
                    section_id, "Study text section not found, leaving document untouched"
                );
                return Ok(AttachOutcome::TargetNotFound);
            }
        };

        match edit {
            MarkerEdit::IndexOutOfRange { marker_count } => {
                warn!(
                    course_id,
                    section_id,
                    marker_index = ?marker_index,
                    marker_count,
                    "Marker index out of range, leaving document untouched"
                );
                Ok(AttachOutcome::MarkerNotFound)
            }
            MarkerEdit::Replaced { index, .. } => {
                self.save(course_id, document).await?;
                info!(course_id, section_id, index, "Replaced study text marker");
                Ok(AttachOutcome::Attached)
            }
            MarkerEdit::Appended { .. } => {
                self.save(course_id, document).await?;
                info!(course_id, section_id, "Appended study text marker");
                Ok(AttachOutcome::Attached)
            }
        }
    }
}
