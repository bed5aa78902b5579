//! Owned handle over the running actor system.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorRef};
use storage::{RetentionSweeper, Storage};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use unmark_core::config::{
    DRAIN_CEILING, DRAIN_POLL_INTERVAL, STATUS_PURGE_INTERVAL, SWEEP_INTERVAL,
};
use unmark_core::{
    ImageFormat, JobId, JobState, QueueConfig, QueueStats, Settings, StatusError, StatusRecord,
};

use crate::handler::ImageProcessor;
use crate::messages::{ActorError, QueueMessage, QueuedJob, SupervisorMessage};
use crate::queue_actor::QueueArgs;
use crate::registry::StatusRegistry;
use crate::supervisor::{Supervisor, SupervisorArgs};

/// Tunables for [`Orchestrator::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorOptions {
    pub queue: QueueConfig,
    /// Age after which artifacts are deleted from disk.
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub purge_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            queue: QueueConfig::with_concurrency(settings.max_concurrent_processes),
            retention: settings.file_retention,
            sweep_interval: SWEEP_INTERVAL,
            purge_interval: STATUS_PURGE_INTERVAL,
        }
    }
}

/// Completion signal for one enqueued job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    position: u32,
    done: oneshot::Receiver<bool>,
}

impl JobHandle {
    /// Queue position at admission; 0 means the job started right away.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Wait for the job to settle. `true` means it completed.
    ///
    /// A job abandoned by a queue shutdown resolves `false`.
    pub async fn wait(self) -> bool {
        match self.done.await {
            Ok(success) => success,
            Err(_) => {
                tracing::debug!("Job {} was dropped before it settled", self.id);
                false
            }
        }
    }
}

/// The running job system: status table, queue and housekeeping.
///
/// Each instance owns its own actors, so several can coexist (tests create a
/// fresh one each).
pub struct Orchestrator {
    registry: Arc<StatusRegistry>,
    storage: Storage,
    supervisor: ActorRef<SupervisorMessage>,
    queue: ActorRef<QueueMessage>,
    supervisor_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Spawn the supervisor and its queue.
    pub async fn start(
        options: OrchestratorOptions,
        registry: Arc<StatusRegistry>,
        storage: Storage,
        processor: Arc<dyn ImageProcessor>,
    ) -> Result<Self, ActorError> {
        let args = SupervisorArgs {
            queue: QueueArgs {
                config: options.queue,
                registry: registry.clone(),
                storage: storage.clone(),
                processor,
            },
            sweeper: RetentionSweeper::new(storage.clone(), options.retention),
            purge_interval: options.purge_interval,
            sweep_interval: options.sweep_interval,
        };

        let (supervisor, handle) = Actor::spawn(None, Supervisor, args).await?;

        let (tx, rx) = ractor::concurrency::oneshot();
        supervisor
            .send_message(SupervisorMessage::GetQueue { reply: tx.into() })
            .map_err(|_| ActorError::QueueUnavailable)?;
        let queue = rx.await.map_err(|_| ActorError::QueueUnavailable)?;

        Ok(Self {
            registry,
            storage,
            supervisor,
            queue,
            supervisor_handle: Mutex::new(Some(handle)),
        })
    }

    pub fn registry(&self) -> &Arc<StatusRegistry> {
        &self.registry
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Add a job to the back of the queue.
    ///
    /// Returns once the job is admitted; the handle resolves when it settles.
    /// The job's status record must already exist.
    pub async fn enqueue(&self, id: JobId, format: ImageFormat) -> Result<JobHandle, ActorError> {
        let (done_tx, done_rx) = oneshot::channel();
        let job = QueuedJob {
            id,
            format,
            done: done_tx,
        };

        let (tx, rx) = ractor::concurrency::oneshot();
        self.queue
            .send_message(QueueMessage::Enqueue {
                job,
                reply: tx.into(),
            })
            .map_err(|_| ActorError::QueueUnavailable)?;
        let position = rx.await.map_err(|_| ActorError::QueueUnavailable)?;

        Ok(JobHandle {
            id,
            position,
            done: done_rx,
        })
    }

    /// 1-indexed position of a pending job, 0 if it is not waiting.
    pub async fn queue_position(&self, id: JobId) -> Result<u32, ActorError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.queue
            .send_message(QueueMessage::QueuePosition {
                id,
                reply: tx.into(),
            })
            .map_err(|_| ActorError::QueueUnavailable)?;
        rx.await.map_err(|_| ActorError::QueueUnavailable)
    }

    pub async fn stats(&self) -> Result<QueueStats, ActorError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.queue
            .send_message(QueueMessage::GetStats { reply: tx.into() })
            .map_err(|_| ActorError::QueueUnavailable)?;
        rx.await.map_err(|_| ActorError::QueueUnavailable)
    }

    /// Status record for a job, with the live queue position while pending.
    pub async fn status(&self, id: JobId) -> Result<StatusRecord, StatusError> {
        let mut record = self.registry.get(id).await?;
        if record.state == JobState::Pending {
            match self.queue_position(id).await {
                Ok(0) => {}
                Ok(position) => record.queue_position = Some(position),
                Err(e) => tracing::debug!("Queue position unavailable for {}: {}", id, e),
            }
        }
        Ok(record)
    }

    /// Wait for the queue to empty, giving up after 30 seconds.
    pub async fn drain(&self) -> bool {
        self.drain_within(DRAIN_CEILING, DRAIN_POLL_INTERVAL).await
    }

    /// Poll every `poll` until no job is pending or active, for at most
    /// `ceiling`. Returns whether the queue actually emptied.
    pub async fn drain_within(&self, ceiling: Duration, poll: Duration) -> bool {
        let wait = async {
            loop {
                match self.stats().await {
                    Ok(stats) if stats.is_idle() => return true,
                    Ok(stats) => {
                        tracing::debug!(
                            "Draining: {} pending, {} active",
                            stats.pending,
                            stats.active
                        );
                    }
                    Err(_) => return false,
                }
                tokio::time::sleep(poll).await;
            }
        };

        match tokio::time::timeout(ceiling, wait).await {
            Ok(drained) => drained,
            Err(_) => {
                tracing::warn!("Queue did not drain within {:?}", ceiling);
                false
            }
        }
    }

    /// Stop the supervisor and queue and wait for the supervisor to exit.
    pub async fn shutdown(&self) {
        let _ = self.supervisor.send_message(SupervisorMessage::Shutdown);
        if let Some(handle) = self.supervisor_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::warn!("Supervisor exited abnormally: {}", e);
        }
    }
}
