//! Baseline construction and storage.
//!
//! A [`Baseline`] records, for every path that differs from the reference
//! point, what the path looked like *before* the change:
//!
//! - [`BaselineEntry::Original`]: the path existed and was changed; holds its
//!   pre-change content.
//! - [`BaselineEntry::Created`]: the path did not exist; for renames, holds
//!   the source path.
//! - [`BaselineEntry::Deleted`]: the path was removed; holds its last
//!   content.
//!
//! Unchanged paths are never stored. Entries are keyed by absolute path, so
//! a path holds at most one state per baseline.
//!
//! [`build_baseline`] turns one status snapshot into a new baseline, and
//! [`BaselineStore`] publishes it with a single pointer swap. Readers take an
//! `Arc` snapshot and never observe a partially built map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, trace};

use crate::fetcher::ContentFetcher;
use crate::policy::TrackablePolicy;
use crate::status::{ChangeClass, StatusEntry};
use crate::vcs::HEAD;

/// Errors that can occur while building a baseline.
#[derive(Error, Debug)]
pub enum BaselineError {
    /// The repository root no longer exists or is not a directory.
    #[error("repository root does not exist: {}", .0.display())]
    RootMissing(PathBuf),
}

/// Pre-change content of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginalContent {
    /// The content was retrieved.
    Available(String),
    /// Retrieval failed, timed out, was oversize, or was not text.
    Unavailable,
}

impl OriginalContent {
    /// Returns true if the content was retrieved.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Returns the retrieved text, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Available(text) => Some(text),
            Self::Unavailable => None,
        }
    }
}

/// State of one changed path relative to the reference point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineEntry {
    /// Existed before the change; holds the original content.
    Original(OriginalContent),
    /// Did not exist before the change.
    Created {
        /// Repository-relative source path for renames.
        renamed_from: Option<PathBuf>,
    },
    /// Removed since the reference point; holds the last content.
    Deleted(OriginalContent),
}

impl BaselineEntry {
    /// Returns the original content for [`Original`](Self::Original) and
    /// [`Deleted`](Self::Deleted) entries.
    #[must_use]
    pub fn original(&self) -> Option<&OriginalContent> {
        match self {
            Self::Original(content) | Self::Deleted(content) => Some(content),
            Self::Created { .. } => None,
        }
    }
}

/// Where a baseline's originals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaselineOrigin {
    /// Originals are fetched from version-control history.
    VersionControl,
    /// Originals were captured from disk by a manual reset.
    Snapshot,
}

/// An immutable set of baseline entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    entries: HashMap<PathBuf, BaselineEntry>,

    /// Entries captured by a snapshot reset. They survive refreshes until the
    /// next version-control reset.
    pinned: Arc<HashMap<PathBuf, BaselineEntry>>,

    origin: BaselineOrigin,
    head: Option<String>,
    generation: u64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self::empty(None)
    }
}

impl Baseline {
    /// Creates an empty version-control baseline at `head`.
    #[must_use]
    pub fn empty(head: Option<String>) -> Self {
        Self {
            entries: HashMap::new(),
            pinned: Arc::new(HashMap::new()),
            origin: BaselineOrigin::VersionControl,
            head,
            generation: 0,
        }
    }

    /// Creates a snapshot baseline whose entries are pinned until the next
    /// version-control reset.
    #[must_use]
    pub fn snapshot(entries: HashMap<PathBuf, BaselineEntry>, head: Option<String>) -> Self {
        Self {
            entries: entries.clone(),
            pinned: Arc::new(entries),
            origin: BaselineOrigin::Snapshot,
            head,
            generation: 0,
        }
    }

    /// Returns the entry for an absolute path.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&BaselineEntry> {
        self.entries.get(path)
    }

    /// Iterates over `(absolute path, entry)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &BaselineEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn origin(&self) -> BaselineOrigin {
        self.origin
    }

    /// HEAD revision the baseline was built against, if known.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.head.as_deref()
    }

    /// Monotonic number assigned when the baseline was committed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `other` holds the same entries, pinned set, origin,
    /// and HEAD. Generations are ignored.
    #[must_use]
    pub fn same_entries(&self, other: &Baseline) -> bool {
        self.origin == other.origin
            && self.head == other.head
            && self.entries == other.entries
            && self.pinned == other.pinned
    }

    /// Returns true if originals held by `previous` can be reused when
    /// building against `head`.
    ///
    /// HEAD must not have moved. An unknown HEAD only matches when
    /// `previous` is a snapshot, since a version-control baseline without a
    /// HEAD says nothing about where its originals came from.
    fn can_reuse_from(previous: &Baseline, head: Option<&str>) -> bool {
        if previous.head() != head {
            return false;
        }
        match previous.origin {
            BaselineOrigin::Snapshot => true,
            BaselineOrigin::VersionControl => head.is_some(),
        }
    }
}

/// Holds the active baseline and swaps it atomically.
#[derive(Debug, Default)]
pub struct BaselineStore {
    current: RwLock<Arc<Baseline>>,
    generation: AtomicU64,
}

impl BaselineStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active baseline.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Baseline> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Publishes `baseline` as the active baseline and returns it with its
    /// generation assigned.
    pub fn replace(&self, mut baseline: Baseline) -> Arc<Baseline> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        baseline.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let baseline = Arc::new(baseline);
        *guard = Arc::clone(&baseline);
        baseline
    }

    /// Replaces the active baseline with an empty one.
    pub fn clear(&self) -> Arc<Baseline> {
        self.replace(Baseline::empty(None))
    }
}

/// Pending retrieval of a path's original content.
struct FetchRequest {
    relative: PathBuf,
    absolute: PathBuf,
    deleted: bool,
}

/// Builds a new baseline from one status snapshot.
///
/// Entries are partitioned by classification:
///
/// - rename sources are fetched; rename destinations are marked created,
/// - untracked and added paths are marked created,
/// - deleted paths are fetched and marked deleted,
/// - modified, type-changed, and unmerged paths are fetched.
///
/// Every path must resolve inside `root` and pass `policy` before it is
/// recorded. Originals already held by `previous` are reused while HEAD has
/// not moved. Pinned snapshot entries and the snapshot origin are carried
/// over unchanged; only an explicit reset returns to a version-control
/// baseline.
///
/// # Errors
///
/// Returns [`BaselineError::RootMissing`] if `root` is not a directory. No
/// fetches are attempted in that case.
pub async fn build_baseline(
    root: &Path,
    entries: &[StatusEntry],
    head: Option<String>,
    previous: &Baseline,
    policy: &TrackablePolicy,
    fetcher: &ContentFetcher,
) -> Result<Baseline, BaselineError> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(BaselineError::RootMissing(root.to_path_buf())),
    }

    let pinned = match previous.origin {
        BaselineOrigin::Snapshot => Arc::clone(&previous.pinned),
        BaselineOrigin::VersionControl => Arc::new(HashMap::new()),
    };
    let reuse = Baseline::can_reuse_from(previous, head.as_deref());

    let mut created: HashMap<PathBuf, BaselineEntry> = HashMap::new();
    let mut requests: Vec<FetchRequest> = Vec::new();

    for entry in entries {
        match entry.classify() {
            ChangeClass::RenameOrCopy => {
                let source = entry.renamed_from.as_ref().and_then(|rel| {
                    policy
                        .admit(root, rel)
                        .map(|absolute| (rel.clone(), absolute))
                });
                if let Some((relative, absolute)) = &source {
                    requests.push(FetchRequest {
                        relative: relative.clone(),
                        absolute: absolute.clone(),
                        deleted: false,
                    });
                }
                if let Some(absolute) = policy.admit(root, &entry.path) {
                    let renamed_from = source.map(|(relative, _)| relative);
                    created.insert(absolute, BaselineEntry::Created { renamed_from });
                }
            }
            ChangeClass::Created => {
                if let Some(absolute) = policy.admit(root, &entry.path) {
                    created.insert(absolute, BaselineEntry::Created { renamed_from: None });
                }
            }
            ChangeClass::Deleted | ChangeClass::ModifiedLike => {
                if let Some(absolute) = policy.admit(root, &entry.path) {
                    requests.push(FetchRequest {
                        relative: entry.path.clone(),
                        absolute,
                        deleted: entry.classify() == ChangeClass::Deleted,
                    });
                }
            }
            ChangeClass::Unknown => {
                trace!(path = %entry.path.display(), code = %entry.code, "Skipping status entry");
            }
        }
    }

    // Pinned paths keep their snapshot state; nothing to fetch for them.
    created.retain(|path, _| !pinned.contains_key(path));
    requests.retain(|req| !pinned.contains_key(&req.absolute));

    let mut resolved: HashMap<PathBuf, BaselineEntry> = HashMap::new();
    let mut to_fetch: Vec<&FetchRequest> = Vec::new();
    for req in &requests {
        let prior = reuse
            .then(|| previous.get(&req.absolute).and_then(BaselineEntry::original))
            .flatten()
            .filter(|content| content.is_available());
        match prior {
            Some(content) => {
                resolved.insert(req.absolute.clone(), wrap(content.clone(), req.deleted));
            }
            None => to_fetch.push(req),
        }
    }

    debug!(
        root = %root.display(),
        created = created.len(),
        reused = resolved.len(),
        fetching = to_fetch.len(),
        "Building baseline"
    );

    let revision = head.as_deref().unwrap_or(HEAD);
    let mut fetched = fetcher
        .fetch_all(root, revision, to_fetch.iter().map(|req| req.relative.clone()))
        .await;
    for req in to_fetch {
        let content = fetched
            .remove(&req.relative)
            .unwrap_or(OriginalContent::Unavailable);
        resolved.insert(req.absolute.clone(), wrap(content, req.deleted));
    }

    // An original outranks a created marker for the same path (for example
    // a file removed from the index but still present on disk).
    let mut all = created;
    all.extend(resolved);
    all.extend(pinned.iter().map(|(k, v)| (k.clone(), v.clone())));

    Ok(Baseline {
        entries: all,
        pinned: Arc::clone(&pinned),
        origin: previous.origin,
        head,
        generation: 0,
    })
}

fn wrap(content: OriginalContent, deleted: bool) -> BaselineEntry {
    if deleted {
        BaselineEntry::Deleted(content)
    } else {
        BaselineEntry::Original(content)
    }
}
