//! Upload acceptance: validation, storage and enqueueing per file.

use bytes::Bytes;
use serde::Serialize;
use unmark_core::config::MAX_FILES_PER_UPLOAD;
use unmark_core::{ImageFormat, JobId, Settings};

use crate::{ApiError, Service};

const MIB: f64 = 1024.0 * 1024.0;

/// One file from an upload request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Accepted,
    Rejected,
}

/// Per-file outcome of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Job id, empty when rejected.
    pub id: String,
    pub original_name: String,
    pub size: u64,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    fn rejected(original_name: impl Into<String>, size: u64, error: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            original_name: original_name.into(),
            size,
            status: UploadStatus::Rejected,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
}

/// Check one file against the accepted formats and size limit.
fn validate(
    name: &str,
    content_type: Option<&str>,
    size: u64,
    settings: &Settings,
) -> Result<ImageFormat, String> {
    let format = ImageFormat::from_file_name(name).ok_or_else(|| {
        "Unsupported file type. Supported formats: JPG, JPEG, PNG, WebP, GIF".to_string()
    })?;

    if !content_type.is_some_and(ImageFormat::is_supported_mime) {
        return Err("Invalid MIME type. File does not appear to be an image.".to_string());
    }

    if size > settings.max_file_size {
        let max_mb = settings.max_file_size_mb();
        let file_mb = size as f64 / MIB;
        return Err(format!(
            "File too large ({file_mb:.1}MB). Maximum size is {max_mb}MB."
        ));
    }

    Ok(format)
}

impl Service {
    /// Accept a batch of files. Each valid file is stored, registered and
    /// queued; the response reports every file individually.
    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<UploadResponse, ApiError> {
        if files.is_empty() {
            return Err(ApiError::BadRequest("No files provided".to_string()));
        }
        if files.len() > MAX_FILES_PER_UPLOAD {
            return Err(ApiError::BadRequest(format!(
                "Maximum {MAX_FILES_PER_UPLOAD} files per upload. Please reduce the batch size."
            )));
        }

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.accept(file).await?);
        }
        Ok(UploadResponse { results })
    }

    async fn accept(&self, file: UploadFile) -> Result<UploadResult, ApiError> {
        let size = file.bytes.len() as u64;
        let Some(name) = file.name.filter(|n| !n.is_empty()) else {
            return Ok(UploadResult::rejected("unknown", 0, "Invalid file"));
        };

        let format = match validate(
            &name,
            file.content_type.as_deref(),
            size,
            self.settings(),
        ) {
            Ok(format) => format,
            Err(reason) => {
                tracing::debug!("Rejected upload {}: {}", name, reason);
                return Ok(UploadResult::rejected(name, size, reason));
            }
        };

        let orchestrator = self.orchestrator();
        let id = JobId::new();
        orchestrator.storage().save_upload(id, format, file.bytes).await?;
        orchestrator
            .registry()
            .create(id, name.clone(), format)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        // Fire-and-forget: pollers follow progress through the status record.
        let handle = orchestrator.enqueue(id, format).await?;
        tracing::info!(
            "Accepted {} as {} (queue position {})",
            name,
            id,
            handle.position()
        );

        Ok(UploadResult {
            id: id.to_string(),
            original_name: name,
            size,
            status: UploadStatus::Accepted,
            error: None,
        })
    }
}
