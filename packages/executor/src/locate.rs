//! Finding the tool executable.

use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;
use unmark_core::config::TOOL_BINARY_NAME;

use crate::ExecutorError;

/// Resolves the tool's location and remembers it once found.
///
/// Only a successful lookup is cached. While the tool is missing every run
/// searches again, so installing it takes effect without a restart.
#[derive(Debug)]
pub struct ToolLocator {
    binary_name: String,
    explicit: Option<PathBuf>,
    fallbacks: Vec<PathBuf>,
    resolved: OnceCell<PathBuf>,
}

impl Default for ToolLocator {
    fn default() -> Self {
        Self::new(TOOL_BINARY_NAME)
    }
}

impl ToolLocator {
    /// Search `PATH`, then the usual install locations, for `binary_name`.
    pub fn new(binary_name: impl Into<String>) -> Self {
        let binary_name = binary_name.into();
        let fallbacks = vec![
            PathBuf::from("/usr/local/bin").join(&binary_name),
            PathBuf::from("/usr/bin").join(&binary_name),
            PathBuf::from(".").join(&binary_name),
        ];
        Self {
            binary_name,
            explicit: None,
            fallbacks,
            resolved: OnceCell::new(),
        }
    }

    /// Use exactly this executable and skip the search.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let binary_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| TOOL_BINARY_NAME.to_string());
        Self {
            binary_name,
            explicit: Some(path),
            fallbacks: Vec::new(),
            resolved: OnceCell::new(),
        }
    }

    /// Location of the tool, searching on the first call.
    pub async fn resolve(&self) -> Result<PathBuf, ExecutorError> {
        self.resolved
            .get_or_try_init(|| self.search())
            .await
            .cloned()
    }

    async fn search(&self) -> Result<PathBuf, ExecutorError> {
        let found = match &self.explicit {
            Some(path) => is_executable(path).await.then(|| path.clone()),
            None => self.search_default_locations().await,
        };

        match found {
            Some(path) => {
                tracing::info!("Tool found at: {}", path.display());
                Ok(path)
            }
            None => {
                tracing::warn!(
                    "{} not found. Processing will fail until it is installed.",
                    self.binary_name
                );
                Err(ExecutorError::ToolNotFound(self.binary_name.clone()))
            }
        }
    }

    async fn search_default_locations(&self) -> Option<PathBuf> {
        let on_path = std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(&self.binary_name))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for candidate in on_path.into_iter().chain(self.fallbacks.iter().cloned()) {
            if is_executable(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

async fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}
