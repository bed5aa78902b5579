//! Queue configuration and statistics.

use serde::{Deserialize, Serialize};

/// Default number of external tool invocations allowed at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs processed simultaneously.
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }
}

/// Snapshot of the queue's current load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueStats {
    /// Jobs waiting for a processing slot.
    pub pending: usize,
    /// Jobs currently being processed.
    pub active: usize,
    /// Configured concurrency limit.
    pub concurrency: usize,
}

impl QueueStats {
    /// No queued and no in-flight work.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}
