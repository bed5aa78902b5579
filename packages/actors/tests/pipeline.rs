#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use actors::{FnProcessor, ImageProcessor};
use common::{Harness, TestResult, copying_processor};
use unmark_core::{GENERIC_FAILURE_MESSAGE, JobState, ProcessOutcome};

#[tokio::test]
async fn record_is_terminal_once_the_handle_resolves() -> TestResult {
    let gauge = Arc::default();
    let harness = Harness::start(copying_processor(Duration::from_millis(20), gauge), 2).await?;

    let (id, handle) = harness.submit().await?;
    assert!(handle.wait().await);

    let record = harness.registry.get(id).await?;
    assert_eq!(record.state, JobState::Complete);
    assert!(record.error_message.is_none());
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert!(record.queue_position.is_none());

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn success_without_output_is_an_error() -> TestResult {
    let processor: Arc<dyn ImageProcessor> = Arc::new(FnProcessor::new(|_, _| {
        Box::pin(async { ProcessOutcome::finished(Some(0), String::new(), String::new(), false) })
    }));
    let harness = Harness::start(processor, 1).await?;

    let (id, handle) = harness.submit().await?;
    assert!(!handle.wait().await);

    let record = harness.registry.get(id).await?;
    assert_eq!(record.state, JobState::Error);
    assert_eq!(record.error_message.as_deref(), Some(GENERIC_FAILURE_MESSAGE));

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn panicking_job_fails_and_frees_its_slot() -> TestResult {
    let processor: Arc<dyn ImageProcessor> = Arc::new(FnProcessor::new(|input, _| {
        Box::pin(async move {
            if input.exists() {
                panic!("decoder exploded");
            }
            ProcessOutcome::not_run("input missing")
        })
    }));
    let harness = Harness::start(processor, 1).await?;

    let (first, handle) = harness.submit().await?;
    assert!(!handle.wait().await);
    let record = harness.registry.get(first).await?;
    assert_eq!(record.state, JobState::Error);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Processing error: decoder exploded")
    );

    // The single slot is free again for the next job.
    let (second, handle) = harness.submit().await?;
    assert!(!handle.wait().await);
    assert_eq!(harness.registry.get(second).await?.state, JobState::Error);
    assert!(harness.orchestrator.stats().await?.is_idle());

    harness.orchestrator.shutdown().await;
    Ok(())
}

#[cfg(unix)]
mod with_tool {
    use std::time::Instant;

    use executor::{ExecutorLimits, ToolExecutor, ToolLocator};
    use unmark_core::TIMEOUT_MESSAGE;

    use super::*;
    use crate::common::write_tool;

    async fn harness_for(tool_body: &str, limits: ExecutorLimits) -> TestResult<(tempfile::TempDir, Harness)> {
        let tool_dir = tempfile::tempdir()?;
        let tool = write_tool(tool_dir.path(), tool_body)?;
        let executor = ToolExecutor::with_limits(ToolLocator::at(tool), limits);
        let harness = Harness::start(Arc::new(executor), 5).await?;
        Ok((tool_dir, harness))
    }

    #[tokio::test]
    async fn clean_exit_completes_the_job() -> TestResult {
        let (_tool_dir, harness) = harness_for("exit 0\n", ExecutorLimits::default()).await?;

        let (id, handle) = harness.submit().await?;
        assert!(handle.wait().await);

        let record = harness.registry.get(id).await?;
        assert_eq!(record.state, JobState::Complete);
        assert!(record.error_message.is_none());
        assert!(harness.storage.output_path(id, record.extension).exists());

        harness.orchestrator.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn tool_error_is_reported_with_its_stderr() -> TestResult {
        let (_tool_dir, harness) =
            harness_for("echo 'bad pixel data' >&2\nexit 2\n", ExecutorLimits::default()).await?;

        let (id, handle) = harness.submit().await?;
        assert!(!handle.wait().await);

        let record = harness.registry.get(id).await?;
        assert_eq!(record.state, JobState::Error);
        let message = record.error_message.unwrap_or_default();
        assert!(message.contains("bad pixel data"), "{message}");

        harness.orchestrator.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn hung_tool_times_out() -> TestResult {
        let limits = ExecutorLimits {
            timeout: Duration::from_millis(300),
            kill_grace: Duration::from_millis(300),
        };
        let (_tool_dir, harness) = harness_for("exec sleep 30\n", limits).await?;

        let started = Instant::now();
        let (id, handle) = harness.submit().await?;
        assert!(!handle.wait().await);
        assert!(started.elapsed() < Duration::from_secs(5));

        let record = harness.registry.get(id).await?;
        assert_eq!(record.state, JobState::Error);
        assert_eq!(record.error_message.as_deref(), Some(TIMEOUT_MESSAGE));

        harness.orchestrator.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn missing_tool_fails_every_job() -> TestResult {
        let tool_dir = tempfile::tempdir()?;
        let executor = ToolExecutor::new(ToolLocator::at(tool_dir.path().join("GeminiWatermarkTool")));
        let harness = Harness::start(Arc::new(executor), 5).await?;

        for _ in 0..2 {
            let (id, handle) = harness.submit().await?;
            assert!(!handle.wait().await);
            let message = harness.registry.get(id).await?.error_message.unwrap_or_default();
            assert!(message.contains("not found"), "{message}");
        }

        harness.orchestrator.shutdown().await;
        Ok(())
    }
}
