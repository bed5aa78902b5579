//! Age-based cleanup of the artifact directory.
//!
//! The sweeper knows nothing about job status. It deletes whatever has not
//! been modified within the retention window, so disk usage stays bounded even
//! when in-memory status was lost across a restart.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use object_store::{ObjectStore, ObjectStoreExt};

use crate::Storage;

#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    storage: Storage,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(storage: Storage, retention: Duration) -> Self {
        Self { storage, retention }
    }

    /// Delete every artifact older than the retention window.
    ///
    /// Returns the number of files removed. Entries that cannot be listed or
    /// deleted (already gone, permission races) are skipped.
    pub async fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let store = self.storage.store();
        let mut listing = store.list(None);
        let mut removed = 0;

        while let Some(entry) = listing.next().await {
            let meta = match entry {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("Skipping unreadable artifact entry: {}", e);
                    continue;
                }
            };

            let stale = (now - meta.last_modified)
                .to_std()
                .is_ok_and(|age| age > self.retention);
            if !stale {
                continue;
            }

            match store.delete(&meta.location).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::debug!("Could not remove {}: {}", meta.location, e),
            }
        }

        removed
    }
}
