//! Process executor for the external watermark removal tool.
//!
//! One call to [`ToolExecutor::run`] copies the uploaded file to its output
//! path, runs the tool on the copy (the tool edits in place) and reports a
//! [`ProcessOutcome`](unmark_core::ProcessOutcome). Failures never escape as
//! errors; they are folded into the outcome so the queue can always settle the
//! job.
//!
//! # Termination
//!
//! Every run has a hard deadline. When it passes the tool's process group gets
//! SIGTERM, and if it is still alive after the grace period, SIGKILL.

mod locate;
mod run;

pub use locate::ToolLocator;
pub use run::{ExecutorLimits, ToolExecutor};

/// Reasons a run ended before the tool produced an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0} binary not found. Ensure it is installed.")]
    ToolNotFound(String),

    #[error("Failed to copy file: {0}")]
    Copy(#[source] std::io::Error),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting for the tool to exit: {0}")]
    Wait(#[source] std::io::Error),
}
