//! Version-control history access.
//!
//! The tracker never talks to a version-control tool directly. Everything it
//! needs from history goes through the [`HistoryBackend`] trait:
//!
//! - the machine-readable working-tree status,
//! - the content of a path at a given revision,
//! - the current HEAD revision.
//!
//! [`GitBackend`] is the production implementation. Tests substitute an
//! in-memory backend.

pub mod git;
pub mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use git::GitBackend;
pub use process::{run_command, CommandError, CommandLimits};

/// Revision that baselines are fetched from.
pub const HEAD: &str = "HEAD";

/// Source of working-tree status and historical file content.
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Returns raw NUL-delimited status output for the working tree at
    /// `root`.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] if the status query fails or times out.
    async fn status(&self, root: &Path) -> Result<Vec<u8>, CommandError>;

    /// Returns the raw bytes of `relative` as of `revision`.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] if the path does not exist at that
    /// revision, or the retrieval fails or times out.
    async fn show(
        &self,
        root: &Path,
        revision: &str,
        relative: &Path,
    ) -> Result<Vec<u8>, CommandError>;

    /// Returns the object id HEAD points at, or `None` for an unborn branch
    /// or when the query fails.
    async fn head_revision(&self, root: &Path) -> Option<String>;
}

/// Walks up from `dir` looking for a repository root.
///
/// A directory is a root when it contains a `.git` entry. Both a directory
/// and a file (worktrees, submodules) count.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use livediff_tracker::vcs::resolve_repository_root;
///
/// if let Some(root) = resolve_repository_root(Path::new("src/vcs")) {
///     println!("tracking {}", root.display());
/// }
/// ```
#[must_use]
pub fn resolve_repository_root(dir: &Path) -> Option<PathBuf> {
    let start = dir.canonicalize().ok()?;
    start
        .ancestors()
        .find(|candidate| candidate.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_root_from_nested_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::create_dir(root.join(".git")).unwrap();
        let nested = root.join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(resolve_repository_root(&nested), Some(root.clone()));
        assert_eq!(resolve_repository_root(&root), Some(root));
    }

    #[test]
    fn git_file_marks_a_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        std::fs::write(root.join(".git"), "gitdir: ../elsewhere\n").unwrap();

        assert_eq!(resolve_repository_root(&root), Some(root));
    }

    #[test]
    fn missing_directory_has_no_root() {
        let temp = TempDir::new().unwrap();
        assert_eq!(resolve_repository_root(&temp.path().join("nope")), None);
    }
}
