//! Queue actor: FIFO admission and dispatch under a concurrency limit.

use std::collections::VecDeque;
use std::sync::Arc;

use ractor::{Actor, ActorProcessingErr, ActorRef};
use storage::Storage;
use unmark_core::{JobId, JobState, QueueConfig, QueueStats, StatusUpdate};

use crate::handler::ImageProcessor;
use crate::messages::{QueueMessage, QueuedJob};
use crate::registry::StatusRegistry;
use crate::worker::{JobContext, spawn_job};

/// Error message for jobs still waiting when the queue stops.
pub const SHUTDOWN_MESSAGE: &str = "Service shutting down. Please resubmit.";

/// Arguments for spawning a [`QueueActor`].
pub struct QueueArgs {
    pub config: QueueConfig,
    pub registry: Arc<StatusRegistry>,
    pub storage: Storage,
    pub processor: Arc<dyn ImageProcessor>,
}

/// State for the queue actor.
pub struct QueueActorState {
    config: QueueConfig,
    /// Jobs waiting for a slot, oldest first.
    pending: VecDeque<QueuedJob>,
    /// Jobs dispatched and not yet reported back.
    active: usize,
    jobs: JobContext,
}

impl QueueActorState {
    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending.len(),
            active: self.active,
            concurrency: self.config.concurrency,
        }
    }

    fn position_of(&self, id: JobId) -> u32 {
        self.pending
            .iter()
            .position(|job| job.id == id)
            .map_or(0, |index| index as u32 + 1)
    }

    /// Start jobs from the front of the queue while slots are free. Returns
    /// how many were started.
    async fn dispatch(&mut self) -> usize {
        let mut started = 0;
        while self.active < self.config.concurrency {
            let Some(job) = self.pending.pop_front() else {
                break;
            };
            self.active += 1;
            started += 1;

            if let Err(e) = self
                .jobs
                .registry
                .update(job.id, StatusUpdate::state(JobState::Processing))
                .await
            {
                tracing::warn!("Could not mark job {} processing: {}", job.id, e);
            }
            tracing::debug!(
                "Dispatched job {} ({}/{} active)",
                job.id,
                self.active,
                self.config.concurrency
            );
            spawn_job(self.jobs.clone(), job);
        }
        started
    }

    /// Write every pending job's 1-indexed position to its status record.
    async fn publish_positions(&self) {
        for (index, job) in self.pending.iter().enumerate() {
            let position = index as u32 + 1;
            if let Err(e) = self
                .jobs
                .registry
                .update(job.id, StatusUpdate::queue_position(position))
                .await
            {
                tracing::debug!("Could not update position of job {}: {}", job.id, e);
            }
        }
    }
}

/// Queue actor that owns the pending list and the active count.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor with concurrency {}",
            args.config.concurrency
        );
        Ok(QueueActorState {
            config: args.config,
            pending: VecDeque::new(),
            active: 0,
            jobs: JobContext {
                registry: args.registry,
                storage: args.storage,
                processor: args.processor,
                queue: myself,
            },
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !state.pending.is_empty() || state.active > 0 {
            tracing::warn!(
                "Queue stopped with {} pending and {} active jobs",
                state.pending.len(),
                state.active
            );
        }

        for job in state.pending.drain(..) {
            if let Err(e) = state
                .jobs
                .registry
                .update(job.id, StatusUpdate::failed(SHUTDOWN_MESSAGE))
                .await
            {
                tracing::debug!("Could not fail abandoned job {}: {}", job.id, e);
            }
            let _ = job.done.send(false);
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Enqueue { job, reply } => {
                let id = job.id;
                state.pending.push_back(job);
                state.publish_positions().await;
                if state.dispatch().await > 0 {
                    state.publish_positions().await;
                }

                let position = state.position_of(id);
                tracing::debug!("Enqueued job {} at position {}", id, position);
                let _ = reply.send(position);
            }

            QueueMessage::JobFinished { id, success } => {
                state.active = state.active.saturating_sub(1);
                tracing::debug!(
                    "Job {} finished (success: {}), {} active",
                    id,
                    success,
                    state.active
                );
                if state.dispatch().await > 0 {
                    state.publish_positions().await;
                }
            }

            QueueMessage::QueuePosition { id, reply } => {
                let _ = reply.send(state.position_of(id));
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue");
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}
