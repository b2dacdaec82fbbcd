//! Trackable-path policy.
//!
//! Decides which paths reported by the status query participate in change
//! tracking. A path is trackable when:
//!
//! - it resolves inside the repository root (no absolute paths, no `..`
//!   escapes),
//! - none of its directory components is on the deny-list (build output,
//!   dependency caches, VCS metadata),
//! - its extension is on the allow-list, if one is configured.
//!
//! File size is checked separately with [`TrackablePolicy::is_size_allowed`]
//! because it needs the file (or the fetched content) at hand.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use livediff_tracker::policy::TrackablePolicy;
//!
//! let policy = TrackablePolicy::default();
//! assert!(policy.is_trackable(Path::new("src/lib.rs")));
//! assert!(!policy.is_trackable(Path::new("target/debug/build.log")));
//! assert!(!policy.is_trackable(Path::new("web/node_modules/pkg/index.js")));
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Default per-file size ceiling (4 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 4 * 1024 * 1024;

/// Directory names excluded from tracking by default.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "bin",
    "obj",
    ".next",
    ".venv",
    "__pycache__",
    "vendor",
];

/// Include/exclude/size policy for tracked paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackablePolicy {
    /// Allowed extensions without the leading dot (e.g. `rs`, `ts`).
    /// `None` allows every extension, including extension-less files.
    extension_allowlist: Option<HashSet<String>>,

    /// Directory names that exclude any path passing through them.
    excluded_dirs: HashSet<String>,

    /// Maximum size in bytes of a file (original or current) to diff.
    max_file_bytes: u64,
}

impl Default for TrackablePolicy {
    fn default() -> Self {
        Self {
            extension_allowlist: None,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| (*s).to_string()).collect(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl TrackablePolicy {
    /// Creates a policy from explicit parts.
    ///
    /// Extensions are normalised: a leading dot is stripped and matching is
    /// case-insensitive.
    ///
    /// # Arguments
    ///
    /// * `extension_allowlist` - Allowed extensions, or `None` for all
    /// * `excluded_dirs` - Directory names to exclude
    /// * `max_file_bytes` - Per-file size ceiling
    #[must_use]
    pub fn new(
        extension_allowlist: Option<Vec<String>>,
        excluded_dirs: Vec<String>,
        max_file_bytes: u64,
    ) -> Self {
        let extension_allowlist = extension_allowlist.map(|exts| {
            exts.into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect()
        });

        Self {
            extension_allowlist,
            excluded_dirs: excluded_dirs.into_iter().collect(),
            max_file_bytes,
        }
    }

    /// Returns the per-file size ceiling in bytes.
    #[must_use]
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Returns true if a file of `len` bytes is small enough to diff.
    #[must_use]
    pub fn is_size_allowed(&self, len: u64) -> bool {
        len <= self.max_file_bytes
    }

    /// Checks the directory deny-list and the extension allow-list for a
    /// repository-relative path.
    #[must_use]
    pub fn is_trackable(&self, relative: &Path) -> bool {
        let mut components = relative.components().peekable();
        while let Some(component) = components.next() {
            // The last component is the file name itself, not a directory.
            if components.peek().is_none() {
                break;
            }
            if let Component::Normal(name) = component {
                if name
                    .to_str()
                    .is_some_and(|name| self.excluded_dirs.contains(name))
                {
                    return false;
                }
            }
        }

        match &self.extension_allowlist {
            None => true,
            Some(allowlist) => relative
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| allowlist.contains(&ext.to_ascii_lowercase())),
        }
    }

    /// Resolves a repository-relative path to an absolute path, rejecting
    /// paths that would land outside `root`.
    ///
    /// The check is lexical: absolute paths, root/prefix components and any
    /// `..` component are rejected.
    #[must_use]
    pub fn resolve_within_root(&self, root: &Path, relative: &Path) -> Option<PathBuf> {
        if relative.as_os_str().is_empty() {
            return None;
        }
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return None;
        }
        Some(root.join(relative))
    }

    /// Resolves `relative` under `root` and applies the path filters.
    ///
    /// Returns the absolute path when the path is inside the root and
    /// trackable.
    #[must_use]
    pub fn admit(&self, root: &Path, relative: &Path) -> Option<PathBuf> {
        let absolute = self.resolve_within_root(root, relative)?;
        self.is_trackable(relative).then_some(absolute)
    }
}
