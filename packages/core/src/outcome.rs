//! Result of a single external tool invocation.

use serde::{Deserialize, Serialize};

/// Message shown to users when the tool ran past its deadline.
pub const TIMEOUT_MESSAGE: &str = "Processing timed out. Try a smaller or simpler image.";

/// Message shown when the tool failed without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Processing failed.";

/// Structured outcome of one tool run. Consumed immediately by the queue and
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process never ran or was ended by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// A failure that happened before (or instead of) running the tool.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            timed_out: false,
        }
    }

    /// Build the outcome of a finished process.
    pub fn finished(exit_code: Option<i32>, stdout: String, stderr: String, timed_out: bool) -> Self {
        Self {
            success: exit_code == Some(0) && !timed_out,
            stdout,
            stderr,
            exit_code,
            timed_out,
        }
    }

    /// User-facing failure message: timeout, then captured stderr, then a
    /// generic message.
    pub fn failure_message(&self) -> String {
        if self.timed_out {
            return TIMEOUT_MESSAGE.to_string();
        }
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_string()
        } else {
            format!("Processing error: {stderr}")
        }
    }
}
