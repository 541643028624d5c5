//! Database module for media-worker
//!
//! Provides PostgreSQL operations for the media_jobs queue and the claim protocol.

pub mod connection;
pub mod media_jobs;
pub mod models;
pub mod store;

pub use connection::{create_pool, DbPool};
pub use models::*;
pub use store::{JobStore, PgJobStore};
