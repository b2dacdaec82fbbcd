//! LiveDiff Tracker - command-line front end.
//!
//! # Commands
//!
//! - `livediff-tracker status [DIR]`: Print the files that differ from HEAD
//! - `livediff-tracker watch [DIR]`: Poll and print the list whenever it changes
//!
//! # Environment Variables
//!
//! See the [`config`](livediff_tracker::config) module for available
//! configuration options.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use livediff_tracker::{
    resolve_repository_root, ChangeTracker, ChangedFile, Config, DiffLine, DiffLineType,
};

/// LiveDiff Tracker - live line diffs against version control.
#[derive(Parser, Debug)]
#[command(name = "livediff-tracker")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    LIVEDIFF_POLL_INTERVAL_MS     Poll interval in ms (default: 3000)
    LIVEDIFF_STATUS_TIMEOUT_MS    Status query timeout in ms (default: 8000)
    LIVEDIFF_FETCH_TIMEOUT_MS     Content fetch timeout in ms (default: 4000)
    LIVEDIFF_MAX_FILE_BYTES       Largest file diffed (default: 4194304)
    LIVEDIFF_CONTEXT_LINES        Context lines around changes (default: 3)
    LIVEDIFF_FETCH_PARALLELISM    Concurrent fetches (default: 2 x cores)
    LIVEDIFF_EXTENSION_ALLOWLIST  Comma-separated extensions to track
    LIVEDIFF_EXCLUDED_DIRS        Comma-separated directory names to skip
    LIVEDIFF_DIFF_CACHE_SIZE      Cached diffs per session (default: 256)
    LIVEDIFF_GIT_BIN              Git executable (default: git)

EXAMPLES:
    # List changed files in the current repository
    livediff-tracker status

    # Include collapsed diffs
    livediff-tracker status --diff

    # Follow changes as JSON, polling every second
    livediff-tracker watch --json --interval-ms 1000
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print files that differ from the baseline, then exit.
    Status {
        /// Directory inside the repository (default: current directory).
        dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Keep polling and print the changed-file list whenever it changes.
    ///
    /// Runs until interrupted with Ctrl+C or SIGTERM.
    Watch {
        /// Directory inside the repository (default: current directory).
        dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Poll interval in milliseconds (overrides LIVEDIFF_POLL_INTERVAL_MS).
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

/// Output formatting flags shared by all commands.
#[derive(clap::Args, Debug, Clone, Copy)]
struct OutputArgs {
    /// Emit JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Include the collapsed diff of each file.
    #[arg(long)]
    diff: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Status { dir, output } => runtime.block_on(run_status(dir, output)),
        Command::Watch {
            dir,
            output,
            interval_ms,
        } => runtime.block_on(run_watch(dir, output, interval_ms)),
    }
}

/// Resolves the repository root for `dir`.
fn repository_root(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let Some(root) = resolve_repository_root(&dir) else {
        bail!("{} is not inside a git repository", dir.display());
    };
    Ok(root)
}

/// Runs the status command: one snapshot, then exit.
async fn run_status(dir: Option<PathBuf>, output: OutputArgs) -> Result<()> {
    let tracker = ChangeTracker::from_env().context("Failed to load configuration")?;
    let root = repository_root(dir)?;
    tracker
        .start_tracking(&root)
        .await
        .with_context(|| format!("Failed to track {}", root.display()))?;

    let files = tracker.get_changed_files().await;
    tracker.stop_tracking().await;

    let mut stdout = io::stdout().lock();
    if output.json {
        serde_json::to_writer_pretty(&mut stdout, &project(&files, output.diff))?;
        writeln!(stdout)?;
    } else {
        print_files(&mut stdout, &root, &files, output.diff)?;
    }
    Ok(())
}

/// Runs the watch command until a shutdown signal arrives.
async fn run_watch(
    dir: Option<PathBuf>,
    output: OutputArgs,
    interval_ms: Option<u64>,
) -> Result<()> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    let root = repository_root(dir)?;
    if let Some(ms) = interval_ms {
        if ms == 0 {
            bail!("--interval-ms must be greater than 0");
        }
        config.poll_interval = Duration::from_millis(ms);
    }
    let period = config.poll_interval;

    let tracker = ChangeTracker::new(config);
    tracker
        .start_tracking(&root)
        .await
        .with_context(|| format!("Failed to track {}", root.display()))?;
    info!(root = %root.display(), interval = ?period, "Watching for changes");

    let mut last: Option<Vec<ChangedFile>> = None;
    let mut ticker = tokio::time::interval(period);
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = ticker.tick() => {
                let files = tracker.get_changed_files().await;
                if last.as_ref() == Some(&files) {
                    debug!("No change in changed-file list");
                    continue;
                }

                let mut stdout = io::stdout().lock();
                if output.json {
                    serde_json::to_writer(&mut stdout, &project(&files, output.diff))?;
                    writeln!(stdout)?;
                } else {
                    writeln!(stdout, "--- {} ---", chrono::Local::now().format("%H:%M:%S"))?;
                    print_files(&mut stdout, &root, &files, output.diff)?;
                }
                stdout.flush()?;
                last = Some(files);
            }
        }
    }

    info!("Shutting down");
    tracker.stop_tracking().await;
    Ok(())
}

/// Drops diff lines from the JSON output unless they were asked for.
fn project(files: &[ChangedFile], with_diff: bool) -> Vec<ChangedFile> {
    files
        .iter()
        .cloned()
        .map(|mut file| {
            if !with_diff {
                file.lines.clear();
            }
            file
        })
        .collect()
}

fn print_files(
    out: &mut impl Write,
    root: &Path,
    files: &[ChangedFile],
    with_diff: bool,
) -> io::Result<()> {
    if files.is_empty() {
        writeln!(out, "No changes in {}", root.display())?;
        return Ok(());
    }

    for file in files {
        let name = match &file.renamed_from {
            Some(from) => format!("{} <- {}", file.relative_path.display(), from.display()),
            None => file.relative_path.display().to_string(),
        };
        let counts = if file.diff_available {
            format!("(+{} -{})", file.lines_added, file.lines_removed)
        } else {
            "(diff unavailable)".to_string()
        };
        writeln!(out, "{}  {name} {counts}", file.change_type.code())?;

        if with_diff {
            for line in &file.lines {
                writeln!(out, "    {}", render_line(line))?;
            }
        }
    }
    Ok(())
}

fn render_line(line: &DiffLine) -> String {
    match line.line_type {
        DiffLineType::Context => format!(" {}", line.text),
        DiffLineType::Added => format!("+{}", line.text),
        DiffLineType::Removed => format!("-{}", line.text),
        DiffLineType::Elided => format!("@ {}", line.text),
    }
}

/// Initializes the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
