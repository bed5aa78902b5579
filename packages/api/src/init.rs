//! Service initialization for the image job system.

use std::sync::Arc;

use actors::{ImageProcessor, Orchestrator, OrchestratorOptions, StatusRegistry};
use executor::ToolExecutor;
use serde::Serialize;
use storage::Storage;
use unmark_core::{QueueStats, Settings};

use crate::ApiError;

/// Everything request handlers need, created once at startup.
pub struct Service {
    settings: Settings,
    orchestrator: Orchestrator,
}

/// Liveness summary.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub status: &'static str,
    pub queue: QueueStats,
}

impl Service {
    /// Build the service around the external watermark tool.
    ///
    /// This should be called once at server startup before handling requests.
    pub async fn from_settings(settings: Settings) -> Result<Self, ApiError> {
        let executor = ToolExecutor::from_settings(&settings);
        if !executor.verify_tool().await {
            tracing::warn!("Starting without the watermark tool; uploads will fail until it is installed");
        }
        Self::with_processor(settings, Arc::new(executor)).await
    }

    /// Build the service around any processor.
    pub async fn with_processor(
        settings: Settings,
        processor: Arc<dyn ImageProcessor>,
    ) -> Result<Self, ApiError> {
        tracing::info!("Initializing job system in {}", settings.temp_dir.display());

        let storage = Storage::new(&settings.temp_dir)?;
        let registry = Arc::new(StatusRegistry::new());
        let options = OrchestratorOptions::from_settings(&settings);
        let orchestrator = Orchestrator::start(options, registry, storage, processor).await?;

        tracing::info!(
            "Job system initialized (concurrency {}, retention {:?})",
            settings.max_concurrent_processes,
            settings.file_retention
        );
        Ok(Self {
            settings,
            orchestrator,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub async fn health(&self) -> Result<HealthView, ApiError> {
        let queue = self.orchestrator.stats().await?;
        Ok(HealthView {
            status: "ok",
            queue,
        })
    }

    /// Let in-flight work finish (bounded), then stop the actors.
    pub async fn shutdown(&self) {
        tracing::info!("Draining job queue");
        if !self.orchestrator.drain().await {
            tracing::warn!("Shutting down with unfinished jobs");
        }
        self.orchestrator.shutdown().await;
        tracing::info!("Job system stopped");
    }
}
