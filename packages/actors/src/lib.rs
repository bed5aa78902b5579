//! Actor system for the image job queue.
//!
//! This crate provides the Ractor-based actors that admit jobs, run them with
//! bounded concurrency and keep their status records current.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor; owns the queue and drives housekeeping
//!   ticks (status purge, artifact sweep)
//! - `QueueActor` - FIFO list of pending jobs and the active count
//! - job tasks - one tokio task per dispatched job, reporting back to the queue
//!
//! # Usage
//!
//! ```ignore
//! use actors::{Orchestrator, OrchestratorOptions, StatusRegistry};
//!
//! let orchestrator =
//!     Orchestrator::start(OrchestratorOptions::default(), registry, storage, processor).await?;
//!
//! registry.create(id, "photo.png", ImageFormat::Png).await?;
//! let handle = orchestrator.enqueue(id, ImageFormat::Png).await?;
//! let completed = handle.wait().await;
//! ```

mod handler;
mod messages;
mod orchestrator;
mod queue_actor;
pub mod registry;
mod supervisor;
mod worker;

pub use handler::{FnProcessor, ImageProcessor, OwnedProcessFuture, ProcessFuture};
pub use messages::{ActorError, QueueMessage, QueuedJob, SupervisorMessage};
pub use orchestrator::{JobHandle, Orchestrator, OrchestratorOptions};
pub use queue_actor::{QueueActor, QueueArgs, SHUTDOWN_MESSAGE};
pub use registry::StatusRegistry;
pub use supervisor::{Supervisor, SupervisorArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
