//! Supervisor actor: owns the queue and drives periodic housekeeping.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use storage::RetentionSweeper;
use tokio::task::JoinHandle;

use crate::messages::{QueueMessage, SupervisorMessage};
use crate::queue_actor::{QueueActor, QueueArgs};
use crate::registry::StatusRegistry;

/// Arguments for spawning the [`Supervisor`].
pub struct SupervisorArgs {
    pub queue: QueueArgs,
    pub sweeper: RetentionSweeper,
    /// How often expired status records are purged.
    pub purge_interval: Duration,
    /// How often the artifact directory is swept. The first sweep runs at
    /// start.
    pub sweep_interval: Duration,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    queue: ActorRef<QueueMessage>,
    registry: Arc<StatusRegistry>,
    sweeper: RetentionSweeper,
    timers: Vec<JoinHandle<()>>,
}

/// Send `message()` to `actor` every `period`, starting now, until the actor
/// is gone.
fn every<F>(actor: &ActorRef<SupervisorMessage>, period: Duration, message: F) -> JoinHandle<()>
where
    F: Fn() -> SupervisorMessage + Send + 'static,
{
    let actor = actor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if actor.send_message(message()).is_err() {
                break;
            }
        }
    })
}

/// Supervisor actor that manages the queue.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");

        let registry = args.queue.registry.clone();
        let (queue, _handle) = Actor::spawn_linked(None, QueueActor, args.queue, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn queue: {}", e)))?;

        let timers = vec![
            every(&myself, args.purge_interval, || SupervisorMessage::Tick),
            every(&myself, args.sweep_interval, || {
                SupervisorMessage::SweepArtifacts
            }),
        ];

        Ok(SupervisorState {
            queue,
            registry,
            sweeper: args.sweeper,
            timers,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for timer in state.timers.drain(..) {
            timer.abort();
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
            SupervisorMessage::GetQueue { reply } => {
                let _ = reply.send(state.queue.clone());
            }

            SupervisorMessage::Tick => {
                let purged = state.registry.sweep_expired().await;
                if purged > 0 {
                    tracing::info!("Purged {} expired status records", purged);
                }
            }

            SupervisorMessage::SweepArtifacts => {
                let removed = state.sweeper.sweep_once().await;
                if removed > 0 {
                    tracing::info!("Cleaned up {} old files", removed);
                }
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                let _ = state.queue.send_message(QueueMessage::Shutdown);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::info!("Queue actor {} stopped: {:?}", cell.get_id(), reason);
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::error!("Queue actor {} failed: {}", cell.get_id(), err);
            }
            _ => {}
        }
        Ok(())
    }
}
