//! Per-job task: runs the processor and settles the job's status.

use std::any::Any;
use std::sync::Arc;

use ractor::ActorRef;
use storage::{ArtifactKind, Storage};
use unmark_core::{ImageFormat, JobId, JobState, StatusUpdate};

use crate::handler::ImageProcessor;
use crate::messages::{QueueMessage, QueuedJob};
use crate::registry::StatusRegistry;

/// Everything a job task needs, shared by all jobs of one queue.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub registry: Arc<StatusRegistry>,
    pub storage: Storage,
    pub processor: Arc<dyn ImageProcessor>,
    pub queue: ActorRef<QueueMessage>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Complete,
    Failed(String),
}

/// Run a dispatched job to completion in its own task.
///
/// The status record is settled before the job's completion signal fires, and
/// the queue hears about the freed slot last.
pub(crate) fn spawn_job(ctx: JobContext, job: QueuedJob) {
    tokio::spawn(async move {
        let QueuedJob { id, format, done } = job;

        let inner = tokio::spawn(process(ctx.clone(), id, format));
        let settlement = match inner.await {
            Ok(settlement) => settlement,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!("Job {} panicked: {}", id, message);
                Settlement::Failed(format!("Processing error: {message}"))
            }
            Err(e) => Settlement::Failed(format!("Processing error: {e}")),
        };

        let success = settlement == Settlement::Complete;
        let update = match settlement {
            Settlement::Complete => StatusUpdate::state(JobState::Complete),
            Settlement::Failed(message) => {
                tracing::warn!("Job {} failed: {}", id, message);
                StatusUpdate::failed(message)
            }
        };
        if let Err(e) = ctx.registry.update(id, update).await {
            tracing::warn!("Could not record outcome of job {}: {}", id, e);
        }

        let _ = done.send(success);

        if ctx
            .queue
            .send_message(QueueMessage::JobFinished { id, success })
            .is_err()
        {
            tracing::debug!("Queue gone before job {} reported back", id);
        }
    });
}

async fn process(ctx: JobContext, id: JobId, format: ImageFormat) -> Settlement {
    let input = ctx.storage.input_path(id, format);
    let output = ctx.storage.output_path(id, format);

    let outcome = ctx.processor.process(&input, &output).await;

    let produced = match ctx.storage.exists(ArtifactKind::Processed, id, format).await {
        Ok(exists) => exists,
        Err(e) => {
            tracing::warn!("Could not check output of job {}: {}", id, e);
            false
        }
    };

    if outcome.success && produced {
        tracing::info!("Job {} complete", id);
        Settlement::Complete
    } else {
        Settlement::Failed(outcome.failure_message())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job task panicked".to_string()
    }
}
