use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use unmark_core::config::{KILL_GRACE_PERIOD, PROCESS_TIMEOUT};
use unmark_core::{ProcessOutcome, Settings};

use crate::{ExecutorError, ToolLocator};

/// Cap on captured stdout/stderr per stream (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// How long to wait for pipe readers once the process is gone.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Time limits applied to every tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    pub timeout: Duration,
    pub kill_grace: Duration,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            timeout: PROCESS_TIMEOUT,
            kill_grace: KILL_GRACE_PERIOD,
        }
    }
}

/// Runs the watermark tool on one image at a time.
///
/// The executor is stateless apart from the cached tool location and can be
/// shared freely between concurrent jobs.
#[derive(Debug, Default)]
pub struct ToolExecutor {
    locator: ToolLocator,
    limits: ExecutorLimits,
}

impl ToolExecutor {
    pub fn new(locator: ToolLocator) -> Self {
        Self::with_limits(locator, ExecutorLimits::default())
    }

    pub fn with_limits(locator: ToolLocator, limits: ExecutorLimits) -> Self {
        Self { locator, limits }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let locator = settings
            .tool_path
            .clone()
            .map(ToolLocator::at)
            .unwrap_or_default();
        Self::new(locator)
    }

    /// Look the tool up now, so a missing install is logged at startup rather
    /// than on the first job.
    pub async fn verify_tool(&self) -> bool {
        self.locator.resolve().await.is_ok()
    }

    /// Copy `input` to `output` and run the tool on `output`.
    ///
    /// Never fails: a missing tool, a failed copy or a spawn error all come
    /// back as an unsuccessful outcome whose stderr carries the reason.
    pub async fn run(&self, input: &Path, output: &Path) -> ProcessOutcome {
        match self.try_run(input, output).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Tool run for {} did not start: {}", input.display(), e);
                ProcessOutcome::not_run(e.to_string())
            }
        }
    }

    async fn try_run(&self, input: &Path, output: &Path) -> Result<ProcessOutcome, ExecutorError> {
        let tool = self.locator.resolve().await?;

        // The tool edits its argument in place.
        tokio::fs::copy(input, output)
            .await
            .map_err(ExecutorError::Copy)?;

        let mut command = Command::new(&tool);
        command
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!("Running {} {}", tool.display(), output.display());
        let mut child = command.spawn().map_err(|source| ExecutorError::Spawn {
            tool: tool.display().to_string(),
            source,
        })?;

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let (status, timed_out) = self.supervise(&mut child).await?;

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        if timed_out {
            tracing::warn!("Tool timed out on {}", output.display());
        } else if !status.success() {
            tracing::warn!("Tool exited with {} on {}", status, output.display());
        }

        Ok(ProcessOutcome::finished(
            status.code(),
            stdout,
            stderr,
            timed_out,
        ))
    }

    /// Wait for the child, escalating to termination once the deadline passes.
    async fn supervise(&self, child: &mut Child) -> Result<(ExitStatus, bool), ExecutorError> {
        let deadline = CancellationToken::new();
        let watchdog = tokio::spawn({
            let deadline = deadline.clone();
            let timeout = self.limits.timeout;
            async move {
                tokio::time::sleep(timeout).await;
                deadline.cancel();
            }
        });

        let result = tokio::select! {
            status = child.wait() => {
                status.map(|s| (s, false)).map_err(ExecutorError::Wait)
            }
            () = deadline.cancelled() => {
                self.terminate(child).await.map(|s| (s, true))
            }
        };

        watchdog.abort();
        result
    }

    async fn terminate(&self, child: &mut Child) -> Result<ExitStatus, ExecutorError> {
        tracing::warn!(
            "Tool exceeded {:?}, sending SIGTERM",
            self.limits.timeout
        );
        signal(child, Escalation::Terminate);

        match tokio::time::timeout(self.limits.kill_grace, child.wait()).await {
            Ok(status) => status.map_err(ExecutorError::Wait),
            Err(_) => {
                tracing::warn!(
                    "Tool still running {:?} after SIGTERM, sending SIGKILL",
                    self.limits.kill_grace
                );
                signal(child, Escalation::Kill);
                child.wait().await.map_err(ExecutorError::Wait)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Escalation {
    Terminate,
    Kill,
}

/// Signal the tool's whole process group so helpers it spawned go too.
#[cfg(unix)]
fn signal(child: &mut Child, escalation: Escalation) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let sig = match escalation {
        Escalation::Terminate => Signal::SIGTERM,
        Escalation::Kill => Signal::SIGKILL,
    };

    if let Some(pid) = child.id()
        && let Err(e) = killpg(Pid::from_raw(pid as i32), sig)
    {
        tracing::debug!("Failed to send {:?} to tool group {}: {}", sig, pid, e);
    }

    if let Escalation::Kill = escalation {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn signal(child: &mut Child, _escalation: Escalation) {
    let _ = child.start_kill();
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
        // Keep the pipe open past the cap so the tool never sees SIGPIPE.
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

async fn collect(task: JoinHandle<Vec<u8>>) -> String {
    let abort = task.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::error::Error;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Instant;

    use unmark_core::TIMEOUT_MESSAGE;

    use super::*;

    type TestResult = Result<(), Box<dyn Error>>;

    fn write_tool(dir: &Path, body: &str) -> std::io::Result<PathBuf> {
        let path = dir.join("fake-tool");
        {
            let mut file = std::fs::File::create(&path)?;
            writeln!(file, "#!/bin/sh")?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    fn write_input(dir: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
        let input = dir.join("input.png");
        std::fs::write(&input, b"\x89PNG fake")?;
        Ok((input, dir.join("input_processed.png")))
    }

    fn short_limits() -> ExecutorLimits {
        ExecutorLimits {
            timeout: Duration::from_millis(500),
            kill_grace: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn successful_run_processes_the_copy() -> TestResult {
        let dir = tempfile::tempdir()?;
        let tool = write_tool(dir.path(), "echo \"cleaned $1\"\nprintf done >> \"$1\"\n")?;
        let (input, output) = write_input(dir.path())?;

        let executor = ToolExecutor::new(ToolLocator::at(&tool));
        let outcome = executor.run(&input, &output).await;

        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
        assert!(outcome.stdout.contains("cleaned"));
        assert_eq!(std::fs::read(&output)?, b"\x89PNG fakedone");
        assert_eq!(std::fs::read(&input)?, b"\x89PNG fake");
        Ok(())
    }

    #[tokio::test]
    async fn verbose_tool_output_is_capped_without_failing_the_run() -> TestResult {
        let dir = tempfile::tempdir()?;
        let tool = write_tool(dir.path(), "head -c 11534336 /dev/zero\nexit 0\n")?;
        let (input, output) = write_input(dir.path())?;

        let limits = ExecutorLimits {
            timeout: Duration::from_secs(20),
            kill_grace: Duration::from_millis(500),
        };
        let executor = ToolExecutor::with_limits(ToolLocator::at(&tool), limits);
        let outcome = executor.run(&input, &output).await;

        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.len() as u64, MAX_OUTPUT_BYTES);
        Ok(())
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() -> TestResult {
        let dir = tempfile::tempdir()?;
        let tool = write_tool(dir.path(), "echo 'bad pixel data' >&2\nexit 2\n")?;
        let (input, output) = write_input(dir.path())?;

        let outcome = ToolExecutor::new(ToolLocator::at(&tool))
            .run(&input, &output)
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(2));
        assert_eq!(outcome.failure_message(), "Processing error: bad pixel data");
        Ok(())
    }

    #[tokio::test]
    async fn overrunning_tool_is_terminated() -> TestResult {
        let dir = tempfile::tempdir()?;
        let tool = write_tool(dir.path(), "exec sleep 30\n")?;
        let (input, output) = write_input(dir.path())?;

        let executor = ToolExecutor::with_limits(ToolLocator::at(&tool), short_limits());
        let started = Instant::now();
        let outcome = executor.run(&input, &output).await;

        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert_eq!(outcome.failure_message(), TIMEOUT_MESSAGE);
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    }

    #[tokio::test]
    async fn tool_ignoring_sigterm_is_killed_after_grace() -> TestResult {
        let dir = tempfile::tempdir()?;
        let pid_file = dir.path().join("tool.pid");
        let body = format!(
            "trap '' TERM\necho $$ > '{}'\nwhile true; do sleep 0.1; done\n",
            pid_file.display()
        );
        let tool = write_tool(dir.path(), &body)?;
        let (input, output) = write_input(dir.path())?;

        let executor = ToolExecutor::with_limits(ToolLocator::at(&tool), short_limits());
        let started = Instant::now();
        let outcome = executor.run(&input, &output).await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(started.elapsed() >= Duration::from_millis(1000));
        assert!(started.elapsed() < Duration::from_secs(5));

        let pid: i32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok();
        assert!(!alive, "tool process {pid} survived");
        Ok(())
    }

    #[tokio::test]
    async fn verify_tool_reports_whether_the_tool_is_present() -> TestResult {
        let dir = tempfile::tempdir()?;
        let missing = ToolExecutor::new(ToolLocator::at(dir.path().join("absent")));
        assert!(!missing.verify_tool().await);

        let tool = write_tool(dir.path(), "exit 0\n")?;
        assert!(ToolExecutor::new(ToolLocator::at(&tool)).verify_tool().await);
        Ok(())
    }

    #[tokio::test]
    async fn missing_tool_is_reported_without_touching_output() -> TestResult {
        let dir = tempfile::tempdir()?;
        let (input, output) = write_input(dir.path())?;

        let executor = ToolExecutor::new(ToolLocator::at(dir.path().join("GeminiWatermarkTool")));
        let outcome = executor.run(&input, &output).await;

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stderr.contains("binary not found"));
        assert!(!output.exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_copy_never_invokes_the_tool() -> TestResult {
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("invoked");
        let tool = write_tool(dir.path(), &format!("touch '{}'\n", marker.display()))?;

        let executor = ToolExecutor::new(ToolLocator::at(&tool));
        let outcome = executor
            .run(&dir.path().join("missing.png"), &dir.path().join("out.png"))
            .await;

        assert!(!outcome.success);
        assert!(outcome.stderr.starts_with("Failed to copy file"));
        assert!(!marker.exists());
        Ok(())
    }
}
