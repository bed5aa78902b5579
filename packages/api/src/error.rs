//! Errors surfaced to API callers.

use actors::ActorError;
use storage::StorageError;

/// Failure of an API operation, classified by how the caller should see it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request itself is unacceptable.
    #[error("{0}")]
    BadRequest(String),

    /// Unknown, expired or vanished resource.
    #[error("{0}")]
    NotFound(String),

    /// Something went wrong on our side. The message is safe to show.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!("Storage error: {}", e);
        ApiError::Internal("Storage failure".to_string())
    }
}

impl From<ActorError> for ApiError {
    fn from(e: ActorError) -> Self {
        tracing::error!("Job system error: {}", e);
        ApiError::Internal("Job system unavailable".to_string())
    }
}
