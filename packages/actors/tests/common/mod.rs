#![allow(dead_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{FnProcessor, ImageProcessor, JobHandle, Orchestrator, OrchestratorOptions, StatusRegistry};
use storage::Storage;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use unmark_core::{ImageFormat, JobId, ProcessOutcome, QueueConfig};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// A fresh orchestrator over a scratch artifact directory.
pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<StatusRegistry>,
    pub storage: Storage,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub async fn start(processor: Arc<dyn ImageProcessor>, concurrency: usize) -> TestResult<Self> {
        let options = OrchestratorOptions {
            queue: QueueConfig::with_concurrency(concurrency),
            ..Default::default()
        };
        Self::start_with(processor, options, StatusRegistry::new()).await
    }

    pub async fn start_with(
        processor: Arc<dyn ImageProcessor>,
        options: OrchestratorOptions,
        registry: StatusRegistry,
    ) -> TestResult<Self> {
        Self::start_in(tempfile::tempdir()?, processor, options, registry).await
    }

    /// Start over an existing artifact directory.
    pub async fn start_in(
        dir: TempDir,
        processor: Arc<dyn ImageProcessor>,
        options: OrchestratorOptions,
        registry: StatusRegistry,
    ) -> TestResult<Self> {
        let storage = Storage::new(dir.path())?;
        let registry = Arc::new(registry);
        let orchestrator =
            Orchestrator::start(options, registry.clone(), storage.clone(), processor).await?;
        Ok(Self {
            dir,
            registry,
            storage,
            orchestrator,
        })
    }

    /// Register, store and enqueue one PNG job.
    pub async fn submit(&self) -> TestResult<(JobId, JobHandle)> {
        let id = JobId::new();
        let format = ImageFormat::Png;
        self.registry.create(id, format!("upload-{id}.png"), format).await?;
        std::fs::write(self.storage.input_path(id, format), b"\x89PNG test image")?;
        let handle = self.orchestrator.enqueue(id, format).await?;
        Ok((id, handle))
    }
}

/// Tracks how many processor calls are in flight and the most ever seen.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self.clone())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn copy_through(input: &Path, output: &Path) -> ProcessOutcome {
    match tokio::fs::copy(input, output).await {
        Ok(_) => ProcessOutcome::finished(Some(0), String::new(), String::new(), false),
        Err(e) => ProcessOutcome::not_run(e.to_string()),
    }
}

/// Succeeds after `delay`, producing the output file.
pub fn copying_processor(delay: Duration, gauge: Arc<Gauge>) -> Arc<dyn ImageProcessor> {
    Arc::new(FnProcessor::new(move |input, output| {
        let gauge = gauge.clone();
        Box::pin(async move {
            let _slot = gauge.enter();
            tokio::time::sleep(delay).await;
            copy_through(&input, &output).await
        })
    }))
}

/// Records the order jobs start in, then waits for one permit from `gate`
/// before producing output.
pub fn gated_processor(gate: Arc<Semaphore>, started: Arc<Mutex<Vec<PathBuf>>>) -> Arc<dyn ImageProcessor> {
    Arc::new(FnProcessor::new(move |input, output| {
        let gate = gate.clone();
        let started = started.clone();
        Box::pin(async move {
            started.lock().unwrap().push(input.clone());
            if let Ok(permit) = gate.acquire_owned().await {
                permit.forget();
            }
            copy_through(&input, &output).await
        })
    }))
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Write an executable shell script standing in for the external tool.
#[cfg(unix)]
pub fn write_tool(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("GeminiWatermarkTool");
    {
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "#!/bin/sh")?;
        file.write_all(body.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
