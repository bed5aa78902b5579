//! Status queries and download readiness.

use std::path::{Path, PathBuf};

use serde::Serialize;
use storage::ArtifactKind;
use unmark_core::{JobId, JobState, StatusError, StatusRecord};

use crate::{ApiError, Service};

/// What a poller sees for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub id: String,
    pub state: JobState,
    pub original_name: String,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A processed artifact ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Suggested attachment name, `<original stem>_nowatermark.<ext>`.
    pub file_name: String,
    pub size: u64,
}

/// Attachment name for a processed file.
fn download_name(record: &StatusRecord) -> String {
    let stem = Path::new(&record.original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}_nowatermark.{}", record.extension)
}

impl Service {
    /// Current status of a job.
    pub async fn status(&self, id: &str) -> Result<StatusView, ApiError> {
        let not_found = || ApiError::NotFound("Processing ID not found or expired".to_string());
        let id = JobId::parse(id).map_err(|_| not_found())?;

        let orchestrator = self.orchestrator();
        let record = match orchestrator.status(id).await {
            Ok(record) => record,
            Err(StatusError::NotFound(_)) => return Err(not_found()),
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        };

        let elapsed = orchestrator.registry().elapsed(&record);
        let queue_position = match record.state {
            JobState::Pending => record.queue_position,
            _ => None,
        };

        Ok(StatusView {
            id: record.id.to_string(),
            state: record.state,
            original_name: record.original_name,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            queue_position,
            error_message: record.error_message,
        })
    }

    /// Locate a job's processed file if it can be downloaded now.
    pub async fn download(&self, id: &str) -> Result<Download, ApiError> {
        let not_found = || ApiError::NotFound("File not found or expired".to_string());
        let id = JobId::parse(id).map_err(|_| not_found())?;

        let orchestrator = self.orchestrator();
        let record = orchestrator
            .registry()
            .get(id)
            .await
            .map_err(|_| not_found())?;

        if record.state != JobState::Complete {
            return Err(ApiError::BadRequest(
                "Image is not yet processed".to_string(),
            ));
        }

        let storage = orchestrator.storage();
        let gone = || ApiError::NotFound("Processed file no longer available".to_string());
        if !storage
            .exists(ArtifactKind::Processed, id, record.extension)
            .await?
        {
            return Err(gone());
        }
        let size = storage
            .size(ArtifactKind::Processed, id, record.extension)
            .await
            .map_err(|_| gone())?;

        let file_name = download_name(&record);
        tracing::info!("Serving {} ({} bytes)", file_name, size);

        Ok(Download {
            path: storage.output_path(id, record.extension),
            content_type: record.extension.mime_type(),
            file_name,
            size,
        })
    }
}
