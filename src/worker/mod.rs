//! Worker module for claiming and processing media jobs
//!
//! This module provides:
//! - JobRunner: batch processing and the polling loop
//! - JobProcessor: processes individual jobs (generate, store, attach)
//! - TargetRef: where a job's artifact belongs
//! - WorkerConfig: configuration for the worker

pub mod config;
pub mod processor;
pub mod runner;
pub mod target;

pub use config::{clamp_batch_size, WorkerConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use processor::{JobProcessor, ProcessedJob};
pub use runner::{setup_signal_handler, BatchReport, JobResult, JobRunner};
pub use target::{resolve_target, TargetRef};
