//! Consumer-facing types for changed-file snapshots.
//!
//! These are the records handed to a diff viewer by
//! [`ChangeTracker::get_changed_files`](crate::tracker::ChangeTracker::get_changed_files).
//! All types serialize to camelCase JSON so they can be piped straight into
//! a front end.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a file differs from the active baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeType {
    /// Single-letter status code used by the CLI.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Created => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
            Self::Renamed => 'R',
        }
    }
}

/// Classification of a single emitted diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineType {
    /// Unchanged line shown for context.
    Context,
    /// Line present only in the current content.
    Added,
    /// Line present only in the original content.
    Removed,
    /// Marker standing in for a run of unchanged lines that was collapsed.
    Elided,
}

/// One line of a collapsed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub line_type: DiffLineType,

    /// Line text without its terminator. For [`DiffLineType::Elided`] this is
    /// a human-readable summary.
    pub text: String,

    /// 1-based line number in the original content, if the line exists there.
    pub original_line: Option<usize>,

    /// 1-based line number in the current content, if the line exists there.
    pub current_line: Option<usize>,

    /// Number of unchanged lines hidden behind an elision marker.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub elided_count: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl DiffLine {
    #[must_use]
    pub fn context(text: impl Into<String>, original_line: usize, current_line: usize) -> Self {
        Self {
            line_type: DiffLineType::Context,
            text: text.into(),
            original_line: Some(original_line),
            current_line: Some(current_line),
            elided_count: 0,
        }
    }

    #[must_use]
    pub fn added(text: impl Into<String>, current_line: usize) -> Self {
        Self {
            line_type: DiffLineType::Added,
            text: text.into(),
            original_line: None,
            current_line: Some(current_line),
            elided_count: 0,
        }
    }

    #[must_use]
    pub fn removed(text: impl Into<String>, original_line: usize) -> Self {
        Self {
            line_type: DiffLineType::Removed,
            text: text.into(),
            original_line: Some(original_line),
            current_line: None,
            elided_count: 0,
        }
    }

    /// Creates an elision marker covering `count` unchanged lines.
    #[must_use]
    pub fn elided(count: usize) -> Self {
        let noun = if count == 1 { "line" } else { "lines" };
        Self {
            line_type: DiffLineType::Elided,
            text: format!("... {count} unchanged {noun}"),
            original_line: None,
            current_line: None,
            elided_count: count,
        }
    }

    /// Returns true if this line is a collapsed-run marker.
    #[must_use]
    pub fn is_elided(&self) -> bool {
        self.line_type == DiffLineType::Elided
    }
}

/// A file that differs from the active baseline, with its collapsed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedFile {
    /// Absolute path of the file on disk.
    pub path: PathBuf,

    /// Path relative to the repository root.
    pub relative_path: PathBuf,

    pub change_type: ChangeType,

    /// Relative path the file was renamed from, for [`ChangeType::Renamed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<PathBuf>,

    /// Collapsed line diff against the baseline.
    pub lines: Vec<DiffLine>,

    /// False when the original content could not be retrieved and the diff
    /// was degraded to "everything added".
    pub diff_available: bool,

    pub lines_added: usize,

    pub lines_removed: usize,

    /// Modification time of the current file (or of the poll, for deleted
    /// files). Only used for presentation ordering.
    pub last_modified: DateTime<Utc>,
}

impl ChangedFile {
    /// Returns the total number of changed lines (added + removed).
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.lines_added + self.lines_removed
    }
}
