//! Git implementation of [`HistoryBackend`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::process::{run_command, CommandError, CommandLimits};
use super::HistoryBackend;
use crate::config::Config;

/// Default status query timeout.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(8);

/// Default timeout for a single content fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// Ceiling on status output. Large monorepos with many untracked files can
/// produce a lot of it, but never this much.
const MAX_STATUS_BYTES: u64 = 64 * 1024 * 1024;

/// Ceiling on `rev-parse` output.
const MAX_REV_BYTES: u64 = 256;

/// Runs the `git` executable for status, content, and HEAD queries.
#[derive(Debug, Clone)]
pub struct GitBackend {
    program: PathBuf,
    status_limits: CommandLimits,
    fetch_limits: CommandLimits,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self::new(
            "git",
            DEFAULT_STATUS_TIMEOUT,
            DEFAULT_FETCH_TIMEOUT,
            crate::policy::DEFAULT_MAX_FILE_BYTES,
        )
    }
}

impl GitBackend {
    /// Creates a backend for the given executable and limits.
    ///
    /// # Arguments
    ///
    /// * `program` - Path or name of the `git` executable
    /// * `status_timeout` - Time limit for a status query
    /// * `fetch_timeout` - Time limit for a single `show`
    /// * `max_file_bytes` - Largest file content accepted from `show`
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        status_timeout: Duration,
        fetch_timeout: Duration,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            program: program.into(),
            status_limits: CommandLimits {
                timeout: status_timeout,
                max_output_bytes: MAX_STATUS_BYTES,
            },
            fetch_limits: CommandLimits {
                timeout: fetch_timeout,
                max_output_bytes: max_file_bytes,
            },
        }
    }

    /// Creates a backend from the tracker configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.git_program,
            config.status_timeout,
            config.fetch_timeout,
            config.max_file_bytes,
        )
    }

    fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Formats `<revision>:<path>` with forward slashes, as `git show` expects.
fn object_spec(revision: &str, relative: &Path) -> String {
    let path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("{revision}:{path}")
}

#[async_trait]
impl HistoryBackend for GitBackend {
    async fn status(&self, root: &Path) -> Result<Vec<u8>, CommandError> {
        run_command(
            &self.program(),
            &[
                "--no-optional-locks",
                "status",
                "--porcelain=v1",
                "-z",
                "--untracked-files=all",
            ],
            root,
            self.status_limits,
        )
        .await
    }

    async fn show(
        &self,
        root: &Path,
        revision: &str,
        relative: &Path,
    ) -> Result<Vec<u8>, CommandError> {
        let spec = object_spec(revision, relative);
        run_command(&self.program(), &["show", &spec], root, self.fetch_limits).await
    }

    async fn head_revision(&self, root: &Path) -> Option<String> {
        let limits = CommandLimits {
            timeout: self.status_limits.timeout,
            max_output_bytes: MAX_REV_BYTES,
        };
        match run_command(
            &self.program(),
            &["rev-parse", "--verify", "--quiet", "HEAD"],
            root,
            limits,
        )
        .await
        {
            Ok(out) => {
                let rev = String::from_utf8_lossy(&out).trim().to_string();
                (!rev.is_empty()).then_some(rev)
            }
            Err(e) => {
                debug!(root = %root.display(), error = %e, "No HEAD revision");
                None
            }
        }
    }
}
