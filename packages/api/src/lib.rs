//! Service layer for the image job system.
//!
//! This crate sits between the HTTP binary and the actor system:
//! - Upload acceptance (validation, storage, enqueueing)
//! - Status queries and download readiness
//! - Startup and graceful shutdown of the job system

mod error;
mod init;
mod jobs;
mod upload;

pub use error::ApiError;
pub use init::{HealthView, Service};
pub use jobs::{Download, StatusView};
pub use upload::{UploadFile, UploadResponse, UploadResult, UploadStatus};

// Re-export core types for convenience
pub use unmark_core::{ImageFormat, JobId, JobState, Settings};
