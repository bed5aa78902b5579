//! In-memory status table shared by the queue, the job tasks and pollers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use unmark_core::config::STATUS_MAX_AGE;
use unmark_core::{ImageFormat, JobId, StatusError, StatusRecord, StatusUpdate};

/// Status records keyed by job id.
///
/// Records expire `max_age` after creation whatever their state. Reads drop
/// an expired record on sight and [`StatusRegistry::sweep_expired`] purges the
/// rest periodically.
#[derive(Debug)]
pub struct StatusRegistry {
    records: RwLock<HashMap<JobId, StatusRecord>>,
    max_age: Duration,
}

impl Default for StatusRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::with_max_age(STATUS_MAX_AGE)
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Register a new job in the `pending` state.
    pub async fn create(
        &self,
        id: JobId,
        original_name: impl Into<String>,
        extension: ImageFormat,
    ) -> Result<StatusRecord, StatusError> {
        let now = Utc::now();
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(&id)
            && !existing.is_expired(now, self.max_age)
        {
            return Err(StatusError::AlreadyExists(id));
        }

        let record = StatusRecord::new(id, original_name, extension, now);
        records.insert(id, record.clone());
        tracing::debug!("Job {} registered as pending", id);
        Ok(record)
    }

    /// Merge `update` into the job's record and return the result.
    pub async fn update(&self, id: JobId, update: StatusUpdate) -> Result<StatusRecord, StatusError> {
        let now = Utc::now();
        let mut records = self.records.write().await;

        let Some(record) = records.get_mut(&id) else {
            return Err(StatusError::NotFound(id));
        };
        if record.is_expired(now, self.max_age) {
            records.remove(&id);
            return Err(StatusError::NotFound(id));
        }

        let previous = record.state;
        record.apply(update, now)?;
        if record.state != previous {
            tracing::debug!("Job {} moved from {} to {}", id, previous, record.state);
        }
        Ok(record.clone())
    }

    /// Current record for a job, unless it is unknown or expired.
    pub async fn get(&self, id: JobId) -> Result<StatusRecord, StatusError> {
        let now = Utc::now();
        {
            let records = self.records.read().await;
            match records.get(&id) {
                None => return Err(StatusError::NotFound(id)),
                Some(record) if !record.is_expired(now, self.max_age) => return Ok(record.clone()),
                Some(_) => {}
            }
        }

        // Expired: take the write lock to drop it. Re-check in case the record
        // was replaced in between.
        let mut records = self.records.write().await;
        if records
            .get(&id)
            .is_some_and(|record| record.is_expired(now, self.max_age))
        {
            records.remove(&id);
        }
        Err(StatusError::NotFound(id))
    }

    /// Processing time of a record as of now.
    pub fn elapsed(&self, record: &StatusRecord) -> Duration {
        record.elapsed(Utc::now())
    }

    /// Remove every expired record, returning how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now, self.max_age));
        before - records.len()
    }

    /// Number of records currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
