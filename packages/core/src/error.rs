//! Error types shared across packages.

use crate::{JobId, JobState};

/// Errors raised by the status table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("Processing ID not found or expired: {0}")]
    NotFound(JobId),

    #[error("Job {0} is already registered")]
    AlreadyExists(JobId),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
}

/// Errors raised while reading settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
