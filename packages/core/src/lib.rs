//! Core domain types for the image processing service.
//!
//! This crate contains shared types used across all packages:
//! - JobId and ImageFormat identifying a unit of work
//! - StatusRecord and JobState for the per-job lifecycle
//! - ProcessOutcome for a single external tool run
//! - QueueConfig and QueueStats for the admission-controlled queue
//! - Settings read from the environment

pub mod config;
mod error;
mod job;
mod outcome;
mod queue;
mod status;

pub use config::Settings;
pub use error::{ConfigError, StatusError};
pub use job::{ImageFormat, JobId};
pub use outcome::{GENERIC_FAILURE_MESSAGE, ProcessOutcome, TIMEOUT_MESSAGE};
pub use queue::{DEFAULT_CONCURRENCY, QueueConfig, QueueStats};
pub use status::{JobState, StatusRecord, StatusUpdate};
