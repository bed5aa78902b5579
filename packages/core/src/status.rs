//! Status records: the per-job lifecycle that pollers observe.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ImageFormat, JobId, StatusError};

/// Lifecycle state of a job as seen by pollers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted and waiting for a free processing slot.
    #[default]
    Pending,
    /// The external tool is running on this job's file.
    Processing,
    /// The output artifact is ready for download.
    Complete,
    /// Processing failed; see the record's error message.
    Error,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    /// States only move forward: pending, processing, then a terminal state.
    /// Re-entering the current non-terminal state is a no-op transition.
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (JobState::Pending, JobState::Pending | JobState::Processing | JobState::Error) => {
                true
            }
            (
                JobState::Processing,
                JobState::Processing | JobState::Complete | JobState::Error,
            ) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Complete => "complete",
            JobState::Error => "error",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle record kept for a job until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub id: JobId,
    pub state: JobState,
    /// File name as uploaded by the client.
    pub original_name: String,
    pub extension: ImageFormat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once, on the first transition into `processing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set once, on the transition into `complete` or `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 1-indexed position in the pending queue; only present while pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u32>,
}

impl StatusRecord {
    /// Create a new pending record stamped at `now`.
    pub fn new(
        id: JobId,
        original_name: impl Into<String>,
        extension: ImageFormat,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            state: JobState::Pending,
            original_name: original_name.into(),
            extension,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            queue_position: None,
        }
    }

    /// Whether the record has outlived `max_age` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        (now - self.created_at)
            .to_std()
            .is_ok_and(|age| age > max_age)
    }

    /// Merge an update into the record.
    ///
    /// A rejected state transition leaves the record untouched.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<(), StatusError> {
        if let Some(next) = update.state {
            if !self.state.can_transition_to(next) {
                return Err(StatusError::InvalidTransition {
                    id: self.id,
                    from: self.state,
                    to: next,
                });
            }
            if next == JobState::Processing && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.completed_at = Some(now);
            }
            if next != JobState::Pending {
                self.queue_position = None;
            }
            self.state = next;
        }

        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }

        if let Some(position) = update.queue_position
            && self.state == JobState::Pending
        {
            self.queue_position = Some(position);
        }

        self.updated_at = now;
        Ok(())
    }

    /// Time spent processing: running time while `processing`, total
    /// processing time once terminal, zero otherwise.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let span = match (self.state, self.started_at, self.completed_at) {
            (JobState::Processing, Some(started), _) => now - started,
            (state, Some(started), Some(completed)) if state.is_terminal() => completed - started,
            _ => return Duration::ZERO,
        };
        span.to_std().unwrap_or_default()
    }
}

/// Partial update for a [`StatusRecord`]. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: Option<JobState>,
    pub error_message: Option<String>,
    pub queue_position: Option<u32>,
}

impl StatusUpdate {
    pub fn state(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn queue_position(position: u32) -> Self {
        Self {
            queue_position: Some(position),
            ..Default::default()
        }
    }

    /// Transition to `error` with a user-facing message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Error),
            error_message: Some(message.into()),
            queue_position: None,
        }
    }
}
