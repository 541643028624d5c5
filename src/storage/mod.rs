//! Object storage boundary
//!
//! Course documents and generated artifacts both live in buckets behind this trait.

pub mod supabase;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use supabase::SupabaseStorage;

/// Cache directive for artifacts; their paths are unique, so they never change in place
pub const ARTIFACT_CACHE_CONTROL: &str = "max-age=31536000";

/// Options for a single upload
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite an existing object at the same path
    pub upsert: bool,
    pub cache_control: Option<String>,
}

impl UploadOptions {
    /// Long-lived, overwrite-safe upload for a generated artifact
    pub fn artifact(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            upsert: true,
            cache_control: Some(ARTIFACT_CACHE_CONTROL.to_string()),
        }
    }

    /// Upload of a whole course document
    pub fn json_document() -> Self {
        Self {
            content_type: "application/json".to_string(),
            upsert: true,
            cache_control: Some("no-cache".to_string()),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object. `Ok(None)` when it does not exist.
    async fn download(&self, bucket: &str, path: &str) -> Result<Option<Bytes>>;

    /// Upload (or overwrite, per `options.upsert`) an object
    async fn upload(&self, bucket: &str, path: &str, body: Bytes, options: &UploadOptions)
        -> Result<()>;

    /// Public URL for an object in a public bucket
    fn public_url(&self, bucket: &str, path: &str) -> String;
}
