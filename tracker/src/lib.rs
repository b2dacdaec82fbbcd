//! LiveDiff Tracker - version-control change tracking with live line diffs.
//!
//! This crate tracks which files in a working tree differ from a
//! version-control baseline while an agent (human or automated) is editing
//! them, and produces compact line-level diffs for live display.
//!
//! # Overview
//!
//! Nothing here watches the filesystem. Instead the tracker polls the
//! repository's machine-readable status on a fixed interval, fetches the
//! pre-change content of changed files from history in parallel, and keeps
//! the result as an immutable baseline. Diffs are computed on demand against
//! what is on disk at the time of the call. When the working tree returns to
//! a clean state, the baseline advances to the new HEAD automatically.
//!
//! # Modules
//!
//! - [`status`]: Parser for NUL-delimited status output
//! - [`fetcher`]: Parallel retrieval of original file content
//! - [`baseline`]: Baseline construction and atomic storage
//! - [`diff`]: Collapsed line diff computation
//! - [`tracker`]: Tracking session state machine and auto-reset
//! - [`scheduler`]: Fixed-interval poll loop
//! - [`vcs`]: History backend trait, Git backend, subprocess runner
//! - [`policy`]: Trackable-path filtering
//! - [`types`]: Changed-file records handed to consumers
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for tracker operations

pub mod baseline;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetcher;
pub mod policy;
pub mod scheduler;
pub mod status;
pub mod tracker;
pub mod types;
pub mod vcs;

pub use baseline::{Baseline, BaselineEntry, BaselineError, BaselineOrigin, OriginalContent};
pub use config::{Config, ConfigError};
pub use diff::{compute_diff, FileDiff, DEFAULT_CONTEXT_LINES};
pub use error::{Result, TrackerError};
pub use fetcher::ContentFetcher;
pub use policy::TrackablePolicy;
pub use scheduler::PollScheduler;
pub use status::{parse_status_entries, ChangeClass, StatusEntry, StatusFlags};
pub use tracker::{ChangeTracker, PollOutcome, TrackerState};
pub use types::{ChangeType, ChangedFile, DiffLine, DiffLineType};
pub use vcs::{resolve_repository_root, CommandError, GitBackend, HistoryBackend};
