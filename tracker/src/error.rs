//! Error types for the LiveDiff tracker.
//!
//! Each module defines its own error enum; [`TrackerError`] aggregates them
//! for callers that drive the tracker as a whole.

use std::path::PathBuf;

use thiserror::Error;

use crate::baseline::BaselineError;
use crate::config::ConfigError;
use crate::vcs::CommandError;

/// Errors that can occur during tracker operations.
///
/// # Examples
///
/// ```ignore
/// use livediff_tracker::error::TrackerError;
///
/// fn start(tracker: &ChangeTracker, root: &Path) -> Result<(), TrackerError> {
///     tracker.start_tracking(root).await?;
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An external version-control command failed.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The baseline could not be built.
    #[error("baseline error: {0}")]
    Baseline(#[from] BaselineError),

    /// The directory passed to `start_tracking` does not exist.
    #[error("repository root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_module_errors() {
        let err: TrackerError = BaselineError::RootMissing(PathBuf::from("/gone")).into();
        assert_eq!(
            err.to_string(),
            "baseline error: repository root does not exist: /gone"
        );

        let err: TrackerError = ConfigError::InvalidValue {
            key: "LIVEDIFF_CONTEXT_LINES".to_string(),
            message: "expected non-negative integer, got 'x'".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("configuration error: invalid value for"));

        let err: TrackerError = CommandError::TimedOut {
            program: "git".to_string(),
            timeout: std::time::Duration::from_secs(8),
        }
        .into();
        assert!(matches!(err, TrackerError::Command(_)));
    }

    #[test]
    fn root_not_found_display() {
        let err = TrackerError::RootNotFound(PathBuf::from("/nowhere"));
        assert_eq!(err.to_string(), "repository root not found: /nowhere");
    }
}
