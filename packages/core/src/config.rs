//! Service settings read from the environment.
//!
//! Variables (all optional):
//! - `HOST` (default: `0.0.0.0`)
//! - `PORT` (default: `3000`)
//! - `TEMP_DIR` (default: `<system temp>/gemini-watermark`)
//! - `MAX_FILE_SIZE` in bytes (default: 10 MiB)
//! - `MAX_CONCURRENT_PROCESSES` (default: `5`)
//! - `FILE_RETENTION_HOURS` (default: `1`)
//! - `WATERMARK_TOOL_PATH` (default: search the usual install locations)
//!
//! Empty values count as unset.

use std::path::PathBuf;
use std::time::Duration;

use crate::ConfigError;
use crate::queue::DEFAULT_CONCURRENCY;

/// Hard wall-clock limit for one tool run.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Time a terminated tool gets to exit before it is killed.
pub const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Age after which a status record is no longer readable.
pub const STATUS_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// How often expired status records are purged proactively.
pub const STATUS_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How often the artifact directory is swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Upper bound on how long `drain` waits for outstanding work.
pub const DRAIN_CEILING: Duration = Duration::from_secs(30);

/// Poll interval used by `drain`.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum number of files accepted in one upload request.
pub const MAX_FILES_PER_UPLOAD: usize = 10;

/// Name of the external watermark removal executable.
pub const TOOL_BINARY_NAME: &str = "GeminiWatermarkTool";

const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_RETENTION_HOURS: u64 = 1;

/// Settings for the whole service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Directory holding uploaded and processed artifacts.
    pub temp_dir: PathBuf,
    /// Maximum accepted upload size in bytes.
    pub max_file_size: u64,
    pub max_concurrent_processes: usize,
    /// Age after which artifacts are deleted from disk.
    pub file_retention: Duration,
    /// Explicit location of the external tool, skipping the search.
    pub tool_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            temp_dir: std::env::temp_dir().join("gemini-watermark"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_concurrent_processes: DEFAULT_CONCURRENCY,
            file_retention: Duration::from_secs(DEFAULT_RETENTION_HOURS * 60 * 60),
            tool_path: None,
        }
    }
}

impl Settings {
    /// Build settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let defaults = Self::default();

        let host = get("HOST").unwrap_or(defaults.host);
        let port = match get("PORT") {
            Some(v) => parse_number("PORT", &v)?,
            None => defaults.port,
        };
        let temp_dir = get("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.temp_dir);
        let max_file_size = match get("MAX_FILE_SIZE") {
            Some(v) => parse_positive("MAX_FILE_SIZE", &v)?,
            None => defaults.max_file_size,
        };
        let max_concurrent_processes = match get("MAX_CONCURRENT_PROCESSES") {
            Some(v) => parse_positive("MAX_CONCURRENT_PROCESSES", &v)?,
            None => defaults.max_concurrent_processes,
        };
        let file_retention = match get("FILE_RETENTION_HOURS") {
            Some(v) => hours("FILE_RETENTION_HOURS", &v)?,
            None => defaults.file_retention,
        };
        let tool_path = get("WATERMARK_TOOL_PATH").map(PathBuf::from);

        Ok(Self {
            host,
            port,
            temp_dir,
            max_file_size,
            max_concurrent_processes,
            file_retention,
            tool_path,
        })
    }

    /// Maximum upload size rounded to whole megabytes, for messages.
    pub fn max_file_size_mb(&self) -> u64 {
        (self.max_file_size as f64 / (1024.0 * 1024.0)).round() as u64
    }
}

fn hours(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let n: u64 = parse_positive(key, value)?;
    n.checked_mul(60 * 60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = parse_number(key, value)?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}
