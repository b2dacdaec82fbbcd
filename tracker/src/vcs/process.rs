//! Scoped subprocess execution with a timeout and an output ceiling.
//!
//! Every external command the tracker runs goes through [`run_command`]. The
//! child is spawned with `kill_on_drop(true)`, so it is terminated on every
//! exit path, including when the calling future is dropped. On timeout or
//! oversize output the child is killed explicitly and reaped before the
//! error is returned.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

/// Maximum number of stderr bytes kept for diagnostics.
const MAX_STDERR_BYTES: u64 = 16 * 1024;

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading output or waiting for the process failed.
    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{program} exited with {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process did not finish within its time limit and was killed.
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    /// The process produced more output than allowed and was killed.
    #[error("{program} output exceeded {limit} bytes")]
    OutputTooLarge { program: String, limit: u64 },
}

/// Limits applied to a single command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Wall-clock limit for the whole invocation.
    pub timeout: Duration,

    /// Maximum number of stdout bytes accepted.
    pub max_output_bytes: u64,
}

/// Runs `program args...` in `cwd` and returns its stdout.
///
/// # Errors
///
/// Returns a [`CommandError`] if the process cannot be spawned, exits with a
/// non-zero status, exceeds `limits.timeout`, or writes more than
/// `limits.max_output_bytes` to stdout.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    limits: CommandLimits,
) -> Result<Vec<u8>, CommandError> {
    trace!(program, ?args, cwd = %cwd.display(), "Running command");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let outcome =
        tokio::time::timeout(limits.timeout, collect_output(&mut child, program, limits)).await;

    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err @ CommandError::NonZeroExit { .. })) => Err(err),
        Ok(Err(err)) => {
            terminate(&mut child, program).await;
            Err(err)
        }
        Err(_) => {
            warn!(program, ?args, timeout = ?limits.timeout, "Command timed out, killing");
            terminate(&mut child, program).await;
            Err(CommandError::TimedOut {
                program: program.to_string(),
                timeout: limits.timeout,
            })
        }
    }
}

/// Reads capped stdout and stderr, then waits for the exit status.
async fn collect_output(
    child: &mut Child,
    program: &str,
    limits: CommandLimits,
) -> Result<Vec<u8>, CommandError> {
    let io_err = |source| CommandError::Io {
        program: program.to_string(),
        source,
    };

    // stderr is drained on its own task so a chatty child can never block on
    // a full pipe while stdout is being read.
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(read_capped(stderr, MAX_STDERR_BYTES)));

    let stdout = match child.stdout.take() {
        Some(stdout) => read_capped(stdout, limits.max_output_bytes + 1)
            .await
            .map_err(io_err)?,
        None => Vec::new(),
    };

    if stdout.len() as u64 > limits.max_output_bytes {
        if let Some(task) = stderr_task {
            task.abort();
        }
        return Err(CommandError::OutputTooLarge {
            program: program.to_string(),
            limit: limits.max_output_bytes,
        });
    }

    let status = child.wait().await.map_err(io_err)?;

    let stderr = match stderr_task {
        Some(task) => task.await.ok().and_then(Result::ok).unwrap_or_default(),
        None => Vec::new(),
    };

    if !status.success() {
        return Err(CommandError::NonZeroExit {
            program: program.to_string(),
            code: status.code(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

async fn read_capped<R>(reader: R, limit: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.take(limit).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Kills and reaps a child that is being abandoned.
async fn terminate(child: &mut Child, program: &str) {
    if let Err(e) = child.start_kill() {
        // Already exited; nothing left to kill.
        trace!(program, error = %e, "Kill after failure was a no-op");
    }
    match child.wait().await {
        Ok(status) => debug!(program, ?status, "Reaped terminated command"),
        Err(e) => warn!(program, error = %e, "Failed to reap terminated command"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn limits(timeout_ms: u64, max: u64) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_millis(timeout_ms),
            max_output_bytes: max,
        }
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = run_command("sh", &["-c", "printf hello"], Path::new("."), limits(5000, 1024))
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_command(
            "sh",
            &["-c", "echo broken >&2; exit 3"],
            Path::new("."),
            limits(5000, 1024),
        )
        .await
        .unwrap_err();

        match err {
            CommandError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let started = std::time::Instant::now();
        let err = run_command("sh", &["-c", "exec sleep 5"], Path::new("."), limits(100, 1024))
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn oversize_output_is_rejected() {
        let err = run_command(
            "sh",
            &["-c", "head -c 4096 /dev/zero"],
            Path::new("."),
            limits(5000, 100),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CommandError::OutputTooLarge { limit: 100, .. }));
    }

    #[tokio::test]
    async fn output_at_limit_is_accepted() {
        let out = run_command("sh", &["-c", "printf 12345"], Path::new("."), limits(5000, 5))
            .await
            .unwrap();
        assert_eq!(out.len(), 5);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_command(
            "definitely-not-a-real-program-livediff",
            &[],
            Path::new("."),
            limits(1000, 10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[test]
    fn error_display() {
        let err = CommandError::TimedOut {
            program: "git".to_string(),
            timeout: Duration::from_secs(4),
        };
        assert_eq!(err.to_string(), "git timed out after 4s");

        let err = CommandError::OutputTooLarge {
            program: "git".to_string(),
            limit: 10,
        };
        assert_eq!(err.to_string(), "git output exceeded 10 bytes");
    }
}
