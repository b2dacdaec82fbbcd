//! Change tracking session and its state machine.
//!
//! A [`ChangeTracker`] owns at most one tracking session at a time. A
//! session is bound to one repository root for its whole lifetime and moves
//! through these states:
//!
//! ```text
//!               start_tracking                window_hidden
//!   Inactive ─────────────────▶ Active ───────────────────▶ Paused
//!      ▲                          ▲  ◀─────────────────────    │
//!      │       stop_tracking      │       window_shown         │
//!      └──────────────────────────┴────────────────────────────┘
//! ```
//!
//! While active, a [`PollScheduler`] calls [`ChangeTracker::poll_tick`] on a
//! fixed interval. Each tick queries the working-tree status:
//!
//! - a dirty status rebuilds the baseline from it,
//! - a clean status advances the baseline to the current HEAD
//!   (auto-reset), guarded so that only one reset runs at a time.
//!
//! Baseline applies are single-flight per session: concurrent callers wait
//! their turn, so the last caller's snapshot is the one left committed.
//! External tool failures are logged and turn the tick into a no-op.
//!
//! Consumers pull results with [`ChangeTracker::get_changed_files`], which
//! compares the committed baseline against what is on disk now.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::baseline::{
    build_baseline, Baseline, BaselineEntry, BaselineOrigin, BaselineStore, OriginalContent,
};
use crate::config::Config;
use crate::diff::{self, FileDiff};
use crate::error::{Result, TrackerError};
use crate::fetcher::ContentFetcher;
use crate::policy::TrackablePolicy;
use crate::scheduler::PollScheduler;
use crate::status::{is_clean, parse_status_entries, StatusEntry};
use crate::types::{ChangeType, ChangedFile};
use crate::vcs::{GitBackend, HistoryBackend};

/// Externally visible tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// No session.
    Inactive,
    /// Session exists and is polling.
    Active,
    /// Session exists, polling is suspended, the baseline is retained.
    Paused,
}

/// Result of a single poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No session, the session is paused, or an auto-reset is in flight.
    Skipped,
    /// The status query failed; nothing changed.
    StatusFailed,
    /// Clean working tree and nothing to reset.
    Clean,
    /// Clean working tree; the baseline was advanced to HEAD.
    AutoReset,
    /// Dirty working tree; the baseline was rebuilt.
    Refreshed,
    /// The baseline could not be rebuilt; the previous one is kept.
    ApplyFailed,
}

/// Key for memoized per-file results. Any change to the file's size or
/// modification time, or a new baseline, produces a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    generation: u64,
    len: Option<u64>,
    modified: Option<SystemTime>,
    source_present: bool,
    consumed: bool,
}

type DiffCache = LruCache<CacheKey, Option<ChangedFile>>;

/// Clears the auto-reset flag when dropped.
struct ResetGuard<'a>(&'a AtomicBool);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// State owned by one tracking session.
struct TrackingSession {
    id: Uuid,
    root: PathBuf,
    store: BaselineStore,
    paused: AtomicBool,
    last_poll: Mutex<Option<DateTime<Utc>>>,
    auto_resetting: AtomicBool,
    apply_lock: tokio::sync::Mutex<()>,
    scheduler: Mutex<Option<PollScheduler>>,
    cache: Option<Mutex<DiffCache>>,
}

impl TrackingSession {
    fn new(root: PathBuf, cache_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            root,
            store: BaselineStore::new(),
            paused: AtomicBool::new(false),
            last_poll: Mutex::new(None),
            auto_resetting: AtomicBool::new(false),
            apply_lock: tokio::sync::Mutex::new(()),
            scheduler: Mutex::new(None),
            cache: NonZeroUsize::new(cache_size).map(|n| Mutex::new(LruCache::new(n))),
        }
    }

    fn stop_scheduler(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    fn cached(&self, key: &CacheKey) -> Option<Option<ChangedFile>> {
        let cache = self.cache.as_ref()?;
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn remember(&self, key: CacheKey, value: Option<ChangedFile>) {
        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .put(key, value);
        }
    }
}

impl Drop for TrackingSession {
    fn drop(&mut self) {
        self.stop_scheduler();
    }
}

/// What is on disk for a path right now.
enum CurrentFile {
    Missing,
    Text(String),
    /// Present but oversize, unreadable, or not UTF-8.
    Opaque,
}

struct Inner {
    backend: Arc<dyn HistoryBackend>,
    fetcher: ContentFetcher,
    policy: TrackablePolicy,
    config: Config,
    session: RwLock<Option<Arc<TrackingSession>>>,
    lifecycle: tokio::sync::Mutex<()>,
}

/// Tracks changes in one repository at a time.
///
/// Cloning is cheap; clones share the same session.
///
/// # Example
///
/// ```no_run
/// use livediff_tracker::{ChangeTracker, Config};
///
/// # async fn example() -> livediff_tracker::Result<()> {
/// let tracker = ChangeTracker::new(Config::default());
/// tracker.start_tracking("/path/to/repo").await?;
///
/// for file in tracker.get_changed_files().await {
///     println!("{} {}", file.change_type.code(), file.relative_path.display());
/// }
///
/// tracker.stop_tracking().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChangeTracker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("state", &self.state())
            .field("root", &self.root())
            .finish()
    }
}

impl ChangeTracker {
    /// Creates a tracker backed by the `git` executable.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let backend = Arc::new(GitBackend::from_config(&config));
        Self::with_backend(backend, config)
    }

    /// Creates a git-backed tracker configured from `LIVEDIFF_*` variables.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Config`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Config::from_env()?))
    }

    /// Creates a tracker with a custom history backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn HistoryBackend>, config: Config) -> Self {
        let fetcher = ContentFetcher::from_config(Arc::clone(&backend), &config);
        let policy = config.policy();
        Self {
            inner: Arc::new(Inner {
                backend,
                fetcher,
                policy,
                config,
                session: RwLock::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn session(&self) -> Option<Arc<TrackingSession>> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_session(&self, next: Option<Arc<TrackingSession>>) -> Option<Arc<TrackingSession>> {
        let mut slot = self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, next)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TrackerState {
        match self.session() {
            None => TrackerState::Inactive,
            Some(s) if s.paused.load(Ordering::SeqCst) => TrackerState::Paused,
            Some(_) => TrackerState::Active,
        }
    }

    /// Returns the repository root of the current session.
    #[must_use]
    pub fn root(&self) -> Option<PathBuf> {
        self.session().map(|s| s.root.clone())
    }

    /// Returns when the last poll tick started, if any.
    #[must_use]
    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        let session = self.session()?;
        let last = *session
            .last_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last
    }

    /// Returns true if the active baseline comes from version control rather
    /// than a manual snapshot. False when there is no session.
    #[must_use]
    pub fn baseline_from_vcs(&self) -> bool {
        self.session()
            .is_some_and(|s| s.store.snapshot().origin() == BaselineOrigin::VersionControl)
    }

    /// Returns the active baseline, if there is a session.
    #[must_use]
    pub fn baseline(&self) -> Option<Arc<Baseline>> {
        self.session().map(|s| s.store.snapshot())
    }

    /// Starts tracking `root`.
    ///
    /// Builds the initial baseline before returning, then starts polling.
    /// Calling this again with the same root is a no-op; a different root
    /// tears down the current session first.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::RootNotFound`] if `root` is not an existing
    /// directory, or [`TrackerError::Io`] if it cannot be resolved. The
    /// current session, if any, is left untouched.
    pub async fn start_tracking(&self, root: impl AsRef<Path>) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let requested = root.as_ref();
        let root = match tokio::fs::canonicalize(requested).await {
            Ok(path) if path.is_dir() => path,
            Ok(_) => return Err(TrackerError::RootNotFound(requested.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrackerError::RootNotFound(requested.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(current) = self.session() {
            if current.root == root {
                debug!(session_id = %current.id, root = %root.display(), "Already tracking root");
                return Ok(());
            }
            info!(
                session_id = %current.id,
                old_root = %current.root.display(),
                new_root = %root.display(),
                "Root changed, restarting tracking"
            );
            self.teardown();
        }

        let session = Arc::new(TrackingSession::new(
            root,
            self.inner.config.diff_cache_size,
        ));
        self.replace_session(Some(Arc::clone(&session)));
        info!(session_id = %session.id, root = %session.root.display(), "Tracking started");

        if !self.refresh_session(&session).await {
            debug!(session_id = %session.id, "Initial baseline not built, will retry on next poll");
        }
        self.start_scheduler(&session);
        Ok(())
    }

    /// Stops tracking and drops all session state.
    pub async fn stop_tracking(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if let Some(session) = self.teardown() {
            info!(session_id = %session.id, root = %session.root.display(), "Tracking stopped");
        }
    }

    fn teardown(&self) -> Option<Arc<TrackingSession>> {
        let session = self.replace_session(None)?;
        session.stop_scheduler();
        Some(session)
    }

    /// Suspends polling while the viewer is hidden. The baseline is kept.
    pub async fn window_hidden(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let Some(session) = self.session() else {
            return;
        };
        if session.paused.swap(true, Ordering::SeqCst) {
            return;
        }
        session.stop_scheduler();
        info!(session_id = %session.id, "Tracking paused");
    }

    /// Resumes polling and refreshes immediately.
    pub async fn window_shown(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let Some(session) = self.session() else {
            return;
        };
        if !session.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(session_id = %session.id, "Tracking resumed");
        self.refresh_session(&session).await;
        self.start_scheduler(&session);
    }

    fn start_scheduler(&self, session: &Arc<TrackingSession>) {
        let tracker = Arc::downgrade(&self.inner);
        let target: Weak<TrackingSession> = Arc::downgrade(session);

        let scheduler = PollScheduler::start(self.inner.config.poll_interval, move || {
            let tracker = tracker.clone();
            let target = target.clone();
            async move {
                let (Some(inner), Some(session)) = (tracker.upgrade(), target.upgrade()) else {
                    return ControlFlow::Break(());
                };
                ChangeTracker { inner }.poll_session(&session).await;
                ControlFlow::Continue(())
            }
        });

        let previous = session
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(scheduler);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Runs one poll cycle against the current session.
    ///
    /// The scheduler calls this on every interval; it can also be driven
    /// directly.
    pub async fn poll_tick(&self) -> PollOutcome {
        match self.session() {
            Some(session) => self.poll_session(&session).await,
            None => PollOutcome::Skipped,
        }
    }

    async fn poll_session(&self, session: &TrackingSession) -> PollOutcome {
        if session.paused.load(Ordering::SeqCst) || session.auto_resetting.load(Ordering::SeqCst)
        {
            trace!(session_id = %session.id, "Poll skipped");
            return PollOutcome::Skipped;
        }

        *session
            .last_poll
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        let raw = match self.inner.backend.status(&session.root).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Status query failed");
                return PollOutcome::StatusFailed;
            }
        };

        if is_clean(&raw) {
            return self.auto_reset(session).await;
        }

        let entries = parse_status_entries(&raw);
        debug!(session_id = %session.id, entries = entries.len(), "Working tree dirty");
        match self.apply_entries(session, &entries).await {
            Ok(true) => PollOutcome::Refreshed,
            Ok(false) => PollOutcome::Skipped,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Baseline not applied");
                PollOutcome::ApplyFailed
            }
        }
    }

    async fn auto_reset(&self, session: &TrackingSession) -> PollOutcome {
        let current = session.store.snapshot();
        if current.is_empty() && current.origin() == BaselineOrigin::VersionControl {
            trace!(session_id = %session.id, "Working tree clean");
            return PollOutcome::Clean;
        }

        if session
            .auto_resetting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return PollOutcome::Skipped;
        }
        let _reset = ResetGuard(&session.auto_resetting);
        let _apply = session.apply_lock.lock().await;

        let head = self.inner.backend.head_revision(&session.root).await;
        let committed = session.store.replace(Baseline::empty(head));
        info!(
            session_id = %session.id,
            head = committed.head().unwrap_or("unborn"),
            generation = committed.generation(),
            "Working tree clean, baseline advanced to HEAD"
        );
        PollOutcome::AutoReset
    }

    /// Re-reads the status and rebuilds the baseline.
    ///
    /// Returns false if there is no session, an auto-reset is in flight, or
    /// the rebuild failed.
    pub async fn refresh(&self) -> bool {
        match self.session() {
            Some(session) => self.refresh_session(&session).await,
            None => false,
        }
    }

    async fn refresh_session(&self, session: &TrackingSession) -> bool {
        match self.try_refresh(session).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Refresh failed");
                false
            }
        }
    }

    async fn try_refresh(&self, session: &TrackingSession) -> Result<bool> {
        if session.auto_resetting.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let raw = self.inner.backend.status(&session.root).await?;
        let entries = parse_status_entries(&raw);
        self.apply_entries(session, &entries).await
    }

    /// Builds and commits a baseline from explicit status entries.
    ///
    /// Returns false, leaving the current baseline untouched, if there is no
    /// session, an auto-reset is in flight, or the root has gone missing.
    pub async fn apply_baseline(&self, entries: &[StatusEntry]) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        match self.apply_entries(&session, entries).await {
            Ok(applied) => applied,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Baseline not applied");
                false
            }
        }
    }

    /// Returns `Ok(false)` if an auto-reset is in flight. A rebuilt baseline
    /// equal to the active one is not re-published, so its generation and
    /// the cached diffs keyed on it survive.
    async fn apply_entries(
        &self,
        session: &TrackingSession,
        entries: &[StatusEntry],
    ) -> Result<bool> {
        if session.auto_resetting.load(Ordering::SeqCst) {
            debug!(session_id = %session.id, "Auto-reset in flight, apply skipped");
            return Ok(false);
        }
        let _apply = session.apply_lock.lock().await;

        let head = self.inner.backend.head_revision(&session.root).await;
        let previous = session.store.snapshot();
        let baseline = build_baseline(
            &session.root,
            entries,
            head,
            &previous,
            &self.inner.policy,
            &self.inner.fetcher,
        )
        .await?;

        let baseline = if baseline.is_empty() {
            Baseline::empty(baseline.head().map(str::to_owned))
        } else {
            baseline
        };
        if previous.same_entries(&baseline) {
            trace!(
                session_id = %session.id,
                generation = previous.generation(),
                "Baseline unchanged"
            );
            return Ok(true);
        }

        let committed = session.store.replace(baseline);
        debug!(
            session_id = %session.id,
            entries = committed.len(),
            generation = committed.generation(),
            "Baseline applied"
        );
        Ok(true)
    }

    /// Drops the active baseline without stopping the session.
    pub fn clear(&self) {
        if let Some(session) = self.session() {
            session.store.clear();
            debug!(session_id = %session.id, "Baseline cleared");
        }
    }

    /// Makes the current on-disk content of every changed file the new
    /// baseline.
    ///
    /// The resulting baseline is a snapshot: [`baseline_from_vcs`] reports
    /// false until the next clean-tree auto-reset. Files that cannot be read
    /// as text keep their version-control original.
    ///
    /// Returns false if there is no session or the status refresh failed.
    ///
    /// [`baseline_from_vcs`]: Self::baseline_from_vcs
    pub async fn reset_to_current(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        if !self.refresh_session(&session).await {
            return false;
        }

        let _apply = session.apply_lock.lock().await;
        let current = session.store.snapshot();
        let mut pinned = std::collections::HashMap::new();
        for (path, entry) in current.iter() {
            match self.read_current(path).await {
                CurrentFile::Text(text) => {
                    pinned.insert(
                        path.clone(),
                        BaselineEntry::Original(OriginalContent::Available(text)),
                    );
                }
                CurrentFile::Missing => {
                    pinned.insert(path.clone(), BaselineEntry::Created { renamed_from: None });
                }
                CurrentFile::Opaque => {
                    pinned.insert(path.clone(), entry.clone());
                }
            }
        }

        let count = pinned.len();
        let head = current.head().map(str::to_owned);
        let committed = session.store.replace(Baseline::snapshot(pinned, head));
        info!(
            session_id = %session.id,
            pinned = count,
            generation = committed.generation(),
            "Baseline reset to current content"
        );
        true
    }

    /// Returns every file that differs from the active baseline, with its
    /// collapsed diff, most recently modified first.
    pub async fn get_changed_files(&self) -> Vec<ChangedFile> {
        let Some(session) = self.session() else {
            return Vec::new();
        };
        let baseline = session.store.snapshot();
        let consumed = self.consumed_rename_sources(&session, &baseline).await;

        let parallelism = self.inner.config.fetch_parallelism.max(1);
        let pending: Vec<_> = baseline
            .iter()
            .map(|(path, entry)| self.describe(&session, &baseline, &consumed, path, entry))
            .collect();
        let mut files: Vec<ChangedFile> = stream::iter(pending)
            .buffer_unordered(parallelism)
            .filter_map(|file| async move { file })
            .collect()
            .await;

        files.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.relative_path.cmp(&b.relative_path))
        });
        trace!(session_id = %session.id, count = files.len(), "Changed files computed");
        files
    }

    /// Rename sources whose content is reported through the destination.
    async fn consumed_rename_sources(
        &self,
        session: &TrackingSession,
        baseline: &Baseline,
    ) -> HashSet<PathBuf> {
        let mut consumed = HashSet::new();
        for (path, entry) in baseline.iter() {
            let BaselineEntry::Created {
                renamed_from: Some(source),
            } = entry
            else {
                continue;
            };
            let source = session.root.join(source);
            if !exists(path).await || exists(&source).await {
                continue;
            }
            if source_text(baseline, &source).is_some() {
                consumed.insert(source);
            }
        }
        consumed
    }

    async fn describe(
        &self,
        session: &TrackingSession,
        baseline: &Baseline,
        consumed: &HashSet<PathBuf>,
        path: &Path,
        entry: &BaselineEntry,
    ) -> Option<ChangedFile> {
        let meta = tokio::fs::metadata(path).await.ok().filter(|m| m.is_file());
        let source_present = match entry {
            BaselineEntry::Created {
                renamed_from: Some(source),
            } => exists(&session.root.join(source)).await,
            _ => false,
        };

        let key = CacheKey {
            path: path.to_path_buf(),
            generation: baseline.generation(),
            len: meta.as_ref().map(std::fs::Metadata::len),
            modified: meta.as_ref().and_then(|m| m.modified().ok()),
            source_present,
            consumed: consumed.contains(path),
        };
        if let Some(hit) = session.cached(&key) {
            return hit;
        }

        let last_modified = key.modified.map_or_else(Utc::now, DateTime::<Utc>::from);
        let current = match &meta {
            None => CurrentFile::Missing,
            Some(_) => self.read_current(path).await,
        };

        let context = self.inner.config.context_lines;
        let built = |change_type: ChangeType,
                     renamed_from: Option<PathBuf>,
                     diff: FileDiff,
                     diff_available: bool| ChangedFile {
            path: path.to_path_buf(),
            relative_path: session.relative(path),
            change_type,
            renamed_from,
            lines: diff.lines,
            diff_available,
            lines_added: diff.lines_added,
            lines_removed: diff.lines_removed,
            last_modified,
        };

        let result = match (entry, current) {
            (BaselineEntry::Created { .. }, CurrentFile::Missing) => None,
            (BaselineEntry::Created { renamed_from }, current) => {
                let source = renamed_from
                    .as_ref()
                    .filter(|_| !source_present)
                    .and_then(|rel| source_text(baseline, &session.root.join(rel)));
                match (source, current) {
                    (Some(original), CurrentFile::Text(text)) => Some(built(
                        ChangeType::Renamed,
                        renamed_from.clone(),
                        diff::compute_diff(original, &text, context),
                        true,
                    )),
                    (Some(_), _) => Some(built(
                        ChangeType::Renamed,
                        renamed_from.clone(),
                        FileDiff::default(),
                        false,
                    )),
                    (None, CurrentFile::Text(text)) => {
                        Some(built(ChangeType::Created, None, diff::all_added(&text), true))
                    }
                    (None, _) => Some(built(ChangeType::Created, None, FileDiff::default(), false)),
                }
            }
            (_, CurrentFile::Missing) if key.consumed => None,
            (entry, CurrentFile::Missing) => {
                let diff = entry
                    .original()
                    .and_then(OriginalContent::as_text)
                    .map(diff::all_removed);
                let available = diff.is_some();
                Some(built(
                    ChangeType::Deleted,
                    None,
                    diff.unwrap_or_default(),
                    available,
                ))
            }
            (entry, CurrentFile::Text(text)) => match entry.original() {
                Some(OriginalContent::Available(original)) if *original == text => None,
                Some(OriginalContent::Available(original)) => {
                    // Line-ending and final-newline differences produce no
                    // diff lines and are not reported.
                    let diff = diff::compute_diff(original, &text, context);
                    (!diff.is_empty())
                        .then(|| built(ChangeType::Modified, None, diff, true))
                }
                _ => Some(built(
                    ChangeType::Modified,
                    None,
                    diff::all_added(&text),
                    false,
                )),
            },
            (_, CurrentFile::Opaque) => Some(built(
                ChangeType::Modified,
                None,
                FileDiff::default(),
                false,
            )),
        };

        session.remember(key, result.clone());
        result
    }

    async fn read_current(&self, path: &Path) -> CurrentFile {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            _ => return CurrentFile::Missing,
        };
        if !self.inner.policy.is_size_allowed(meta.len()) {
            trace!(path = %path.display(), size = meta.len(), "Current file too large to diff");
            return CurrentFile::Opaque;
        }
        match tokio::fs::read(path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => CurrentFile::Text(text),
                Err(_) => CurrentFile::Opaque,
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CurrentFile::Missing,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to read current file");
                CurrentFile::Opaque
            }
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

fn source_text<'a>(baseline: &'a Baseline, source: &Path) -> Option<&'a str> {
    baseline
        .get(source)
        .and_then(BaselineEntry::original)
        .and_then(OriginalContent::as_text)
}
