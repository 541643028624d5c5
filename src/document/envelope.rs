//! Raw vs. enveloped course documents

use crate::error::{MediaWorkerError, Result};
use serde_json::{Map, Value};

const CONTENT_KEY: &str = "content";
const FORMAT_KEY: &str = "format";

/// A course document as stored.
///
/// Documents are either the bare content object or an envelope `{ "format": ..., "content": {...}, ... }`.
/// Mutations only ever see the inner content; [`CourseDocument::into_value`] restores the
/// original shape with every wrapper field intact.
#[derive(Debug, Clone, PartialEq)]
pub enum CourseDocument {
    Raw(Value),
    Enveloped {
        /// Wrapper fields in their original order; the `content` slot holds `null` while
        /// the content is checked out below
        wrapper: Map<String, Value>,
        content: Value,
    },
}

impl CourseDocument {
    /// Classify a parsed document
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut obj)
                if obj.contains_key(FORMAT_KEY)
                    && obj.get(CONTENT_KEY).map(Value::is_object).unwrap_or(false) =>
            {
                let content = obj
                    .get_mut(CONTENT_KEY)
                    .map(Value::take)
                    .unwrap_or(Value::Null);
                Ok(CourseDocument::Enveloped {
                    wrapper: obj,
                    content,
                })
            }
            Value::Object(_) => Ok(CourseDocument::Raw(value)),
            other => Err(MediaWorkerError::InvalidDocument(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse document bytes
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| MediaWorkerError::InvalidDocument(format!("unparsable JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// The envelope's `format` tag, if any
    pub fn format(&self) -> Option<&Value> {
        match self {
            CourseDocument::Raw(_) => None,
            CourseDocument::Enveloped { wrapper, .. } => wrapper.get(FORMAT_KEY),
        }
    }

    pub fn content(&self) -> &Value {
        match self {
            CourseDocument::Raw(content) | CourseDocument::Enveloped { content, .. } => content,
        }
    }

    pub fn content_mut(&mut self) -> &mut Value {
        match self {
            CourseDocument::Raw(content) | CourseDocument::Enveloped { content, .. } => content,
        }
    }

    /// Rewrap into the stored shape
    pub fn into_value(self) -> Value {
        match self {
            CourseDocument::Raw(content) => content,
            CourseDocument::Enveloped {
                mut wrapper,
                content,
            } => {
                if let Some(slot) = wrapper.get_mut(CONTENT_KEY) {
                    *slot = content;
                }
                Value::Object(wrapper)
            }
        }
    }

    /// Serialize back to bytes in the stored shape
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.into_value())?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
