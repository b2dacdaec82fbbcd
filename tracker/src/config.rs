//! Configuration module for the LiveDiff tracker.
//!
//! This module handles parsing configuration from environment variables.
//! Every variable is optional; [`Config::default`] yields the same values as
//! an empty environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LIVEDIFF_POLL_INTERVAL_MS` | 3000 | Milliseconds between status polls |
//! | `LIVEDIFF_STATUS_TIMEOUT_MS` | 8000 | Status query timeout |
//! | `LIVEDIFF_FETCH_TIMEOUT_MS` | 4000 | Per-file content fetch timeout |
//! | `LIVEDIFF_MAX_FILE_BYTES` | 4194304 | Largest file that is diffed |
//! | `LIVEDIFF_CONTEXT_LINES` | 3 | Context lines around each change |
//! | `LIVEDIFF_FETCH_PARALLELISM` | 2 x cores | Concurrent content fetches |
//! | `LIVEDIFF_EXTENSION_ALLOWLIST` | (all) | Comma-separated extensions to track |
//! | `LIVEDIFF_EXCLUDED_DIRS` | built-in list | Comma-separated directory names to skip |
//! | `LIVEDIFF_DIFF_CACHE_SIZE` | 256 | Computed diffs kept per session |
//! | `LIVEDIFF_GIT_BIN` | `git` | Git executable |
//!
//! # Example
//!
//! ```no_run
//! use livediff_tracker::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Polling every {:?}", config.poll_interval);
//! ```

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::diff::DEFAULT_CONTEXT_LINES;
use crate::policy::{TrackablePolicy, DEFAULT_EXCLUDED_DIRS, DEFAULT_MAX_FILE_BYTES};
use crate::vcs::git::{DEFAULT_FETCH_TIMEOUT, DEFAULT_STATUS_TIMEOUT};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of computed diffs cached per session.
pub const DEFAULT_DIFF_CACHE_SIZE: usize = 256;

/// Default git executable.
const DEFAULT_GIT_PROGRAM: &str = "git";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for change tracking.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between status polls while tracking is active.
    pub poll_interval: Duration,

    /// Time limit for one status query.
    pub status_timeout: Duration,

    /// Time limit for one content fetch.
    pub fetch_timeout: Duration,

    /// Largest original or current file that is diffed.
    pub max_file_bytes: u64,

    /// Unchanged lines kept on each side of a change.
    pub context_lines: usize,

    /// Upper bound on concurrent content fetches.
    pub fetch_parallelism: usize,

    /// Optional allowlist of file extensions. If `None`, all files are tracked.
    pub extension_allowlist: Option<Vec<String>>,

    /// Directory names excluded from tracking.
    pub excluded_dirs: Vec<String>,

    /// Capacity of the per-session diff cache. Zero disables caching.
    pub diff_cache_size: usize,

    /// Git executable used by [`GitBackend`](crate::vcs::GitBackend).
    pub git_program: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            context_lines: DEFAULT_CONTEXT_LINES,
            fetch_parallelism: default_fetch_parallelism(),
            extension_allowlist: None,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            diff_cache_size: DEFAULT_DIFF_CACHE_SIZE,
            git_program: PathBuf::from(DEFAULT_GIT_PROGRAM),
        }
    }
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a variable is set but cannot be parsed, or
    /// if a duration or parallelism value is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval = parse_millis("LIVEDIFF_POLL_INTERVAL_MS")?
            .unwrap_or(defaults.poll_interval);
        let status_timeout = parse_millis("LIVEDIFF_STATUS_TIMEOUT_MS")?
            .unwrap_or(defaults.status_timeout);
        let fetch_timeout = parse_millis("LIVEDIFF_FETCH_TIMEOUT_MS")?
            .unwrap_or(defaults.fetch_timeout);

        let max_file_bytes =
            parse_number::<u64>("LIVEDIFF_MAX_FILE_BYTES")?.unwrap_or(defaults.max_file_bytes);

        // Zero context is valid: only changed lines are emitted.
        let context_lines =
            parse_number::<usize>("LIVEDIFF_CONTEXT_LINES")?.unwrap_or(defaults.context_lines);

        let fetch_parallelism = match parse_number::<usize>("LIVEDIFF_FETCH_PARALLELISM")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "LIVEDIFF_FETCH_PARALLELISM".to_string(),
                    message: "parallelism must be greater than 0".to_string(),
                });
            }
            Some(n) => n,
            None => defaults.fetch_parallelism,
        };

        let extension_allowlist = env::var("LIVEDIFF_EXTENSION_ALLOWLIST")
            .ok()
            .map(|val| split_list(&val));

        let excluded_dirs = env::var("LIVEDIFF_EXCLUDED_DIRS")
            .map(|val| split_list(&val))
            .unwrap_or(defaults.excluded_dirs);

        let diff_cache_size = parse_number::<usize>("LIVEDIFF_DIFF_CACHE_SIZE")?
            .unwrap_or(defaults.diff_cache_size);

        let git_program = env::var("LIVEDIFF_GIT_BIN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.git_program);

        Ok(Self {
            poll_interval,
            status_timeout,
            fetch_timeout,
            max_file_bytes,
            context_lines,
            fetch_parallelism,
            extension_allowlist,
            excluded_dirs,
            diff_cache_size,
            git_program,
        })
    }

    /// Builds the trackable-path policy described by this configuration.
    #[must_use]
    pub fn policy(&self) -> TrackablePolicy {
        TrackablePolicy::new(
            self.extension_allowlist.clone(),
            self.excluded_dirs.clone(),
            self.max_file_bytes,
        )
    }
}

/// Twice the number of available cores, at least 2.
fn default_fetch_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_number<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    match parse_number::<u64>(key)? {
        Some(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "duration must be greater than 0".to_string(),
        }),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None => Ok(None),
    }
}
