//! Artifact storage for uploaded and processed images.
//!
//! Every job owns two files in a single flat directory:
//! - `<id>.<ext>` holding the bytes as uploaded
//! - `<id>_processed.<ext>` holding the tool's output
//!
//! Paths are derived deterministically from the job id and image format, so
//! the queue, the executor and the download layer never exchange paths.
//!
//! Implementation note:
//! This is a small wrapper around `object_store`'s local filesystem backend.
//! The external tool needs real paths, so only the filesystem backend is used.

mod retention;

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use unmark_core::{ImageFormat, JobId};

pub use retention::RetentionSweeper;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

/// Which artifact of a job a path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Upload,
    Processed,
}

impl ArtifactKind {
    fn file_name(self, id: JobId, format: ImageFormat) -> String {
        match self {
            ArtifactKind::Upload => format!("{id}.{format}"),
            ArtifactKind::Processed => format!("{id}_processed.{format}"),
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("root", &self.root).finish()
    }
}

impl Storage {
    /// Open the artifact directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        ensure_dir(&root)?;
        let fs = LocalFileSystem::new_with_prefix(&root)?;
        Ok(Self {
            root,
            store: Arc::new(fs),
        })
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    /// Filesystem path of a job artifact.
    pub fn artifact_path(&self, kind: ArtifactKind, id: JobId, format: ImageFormat) -> PathBuf {
        self.root.join(kind.file_name(id, format))
    }

    /// Where the uploaded bytes for a job live.
    pub fn input_path(&self, id: JobId, format: ImageFormat) -> PathBuf {
        self.artifact_path(ArtifactKind::Upload, id, format)
    }

    /// Where the processed output for a job lives.
    pub fn output_path(&self, id: JobId, format: ImageFormat) -> PathBuf {
        self.artifact_path(ArtifactKind::Processed, id, format)
    }

    fn to_key(&self, kind: ArtifactKind, id: JobId, format: ImageFormat) -> Path {
        Path::from(kind.file_name(id, format))
    }

    /// Persist the uploaded bytes at the job's input path.
    pub async fn save_upload(
        &self,
        id: JobId,
        format: ImageFormat,
        bytes: Bytes,
    ) -> Result<PathBuf, StorageError> {
        let key = self.to_key(ArtifactKind::Upload, id, format);
        self.store
            .put(&key, object_store::PutPayload::from(bytes))
            .await?;
        Ok(self.input_path(id, format))
    }

    /// Check whether an artifact is present on disk.
    pub async fn exists(
        &self,
        kind: ArtifactKind,
        id: JobId,
        format: ImageFormat,
    ) -> Result<bool, StorageError> {
        let key = self.to_key(kind, id, format);
        match self.store.head(&key).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Size in bytes of an artifact.
    pub async fn size(
        &self,
        kind: ArtifactKind,
        id: JobId,
        format: ImageFormat,
    ) -> Result<u64, StorageError> {
        let key = self.to_key(kind, id, format);
        Ok(self.store.head(&key).await?.size)
    }

    pub(crate) fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    if root.as_os_str().is_empty() {
        return Err(StorageError::InvalidKey(
            "artifact directory must not be empty".to_string(),
        ));
    }
    std::fs::create_dir_all(root)?;
    Ok(())
}
