//! Message types for actor communication.

use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::oneshot;
use unmark_core::{ImageFormat, JobId, QueueStats};

/// A job waiting in, or dispatched from, the queue.
#[derive(Debug)]
pub struct QueuedJob {
    pub id: JobId,
    pub format: ImageFormat,
    /// Resolved exactly once with whether the job completed.
    pub done: oneshot::Sender<bool>,
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Append a job to the queue. Replies with its 1-indexed position after
    /// dispatch, or 0 if it started immediately.
    Enqueue {
        job: QueuedJob,
        reply: RpcReplyPort<u32>,
    },

    /// A dispatched job has settled and freed its slot.
    JobFinished { id: JobId, success: bool },

    /// 1-indexed position of a pending job, 0 if it is not pending.
    QueuePosition { id: JobId, reply: RpcReplyPort<u32> },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop the queue. Jobs still pending are abandoned.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Get the queue actor.
    GetQueue {
        reply: RpcReplyPort<ActorRef<QueueMessage>>,
    },

    /// Purge expired status records.
    Tick,

    /// Delete artifacts past the retention window.
    SweepArtifacts,

    /// Stop the queue and the supervisor.
    Shutdown,
}

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("failed to start actors: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("queue is not running")]
    QueueUnavailable,
}
