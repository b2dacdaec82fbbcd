//! Parallel retrieval of pre-change file content.
//!
//! Given a batch of repository-relative paths, the fetcher asks the
//! [`HistoryBackend`] for each path's content at a revision. It runs at most
//! `min(pending, parallelism)` retrievals at a time. Every path in the batch
//! gets a result: a retrieval that fails, times out, is oversize, or is not
//! valid UTF-8 is recorded as [`OriginalContent::Unavailable`] instead of
//! failing the batch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, trace, warn};

use crate::baseline::OriginalContent;
use crate::config::Config;
use crate::vcs::HistoryBackend;

/// Fetches original content for batches of paths.
#[derive(Clone)]
pub struct ContentFetcher {
    backend: Arc<dyn HistoryBackend>,
    parallelism: usize,
    timeout: Duration,
    max_file_bytes: u64,
}

impl std::fmt::Debug for ContentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFetcher")
            .field("parallelism", &self.parallelism)
            .field("timeout", &self.timeout)
            .field("max_file_bytes", &self.max_file_bytes)
            .finish_non_exhaustive()
    }
}

impl ContentFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    ///
    /// * `backend` - Source of historical content
    /// * `parallelism` - Maximum concurrent retrievals (clamped to at least 1)
    /// * `timeout` - Time limit per retrieval
    /// * `max_file_bytes` - Largest accepted content
    #[must_use]
    pub fn new(
        backend: Arc<dyn HistoryBackend>,
        parallelism: usize,
        timeout: Duration,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            backend,
            parallelism: parallelism.max(1),
            timeout,
            max_file_bytes,
        }
    }

    /// Creates a fetcher with limits taken from `config`.
    #[must_use]
    pub fn from_config(backend: Arc<dyn HistoryBackend>, config: &Config) -> Self {
        Self::new(
            backend,
            config.fetch_parallelism,
            config.fetch_timeout,
            config.max_file_bytes,
        )
    }

    /// Fetches every path in `paths` at `revision`.
    ///
    /// Duplicate paths are fetched once. The returned map has exactly one
    /// entry per distinct input path, keyed by the relative path.
    pub async fn fetch_all<I>(
        &self,
        root: &Path,
        revision: &str,
        paths: I,
    ) -> HashMap<PathBuf, OriginalContent>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut seen = HashSet::new();
        let pending: Vec<PathBuf> = paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();

        if pending.is_empty() {
            return HashMap::new();
        }

        let limit = pending.len().min(self.parallelism);
        debug!(
            root = %root.display(),
            count = pending.len(),
            parallelism = limit,
            "Fetching original content"
        );

        stream::iter(pending)
            .map(|relative| async move {
                let content = self.fetch_one(root, revision, &relative).await;
                (relative, content)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    async fn fetch_one(&self, root: &Path, revision: &str, relative: &Path) -> OriginalContent {
        let result =
            tokio::time::timeout(self.timeout, self.backend.show(root, revision, relative)).await;

        let bytes = match result {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(path = %relative.display(), error = %e, "Original content unavailable");
                return OriginalContent::Unavailable;
            }
            Err(_) => {
                warn!(
                    path = %relative.display(),
                    timeout = ?self.timeout,
                    "Original content fetch timed out"
                );
                return OriginalContent::Unavailable;
            }
        };

        if bytes.len() as u64 > self.max_file_bytes {
            debug!(
                path = %relative.display(),
                size = bytes.len(),
                limit = self.max_file_bytes,
                "Original content too large to diff"
            );
            return OriginalContent::Unavailable;
        }

        match String::from_utf8(bytes) {
            Ok(text) => {
                trace!(path = %relative.display(), size = text.len(), "Fetched original");
                OriginalContent::Available(text)
            }
            Err(_) => {
                debug!(path = %relative.display(), "Original content is not UTF-8");
                OriginalContent::Unavailable
            }
        }
    }
}
