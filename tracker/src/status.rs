//! Parser for machine-readable, NUL-delimited status output.
//!
//! The input is the output of `git status --porcelain=v1 -z`: a sequence of
//! NUL-terminated records, each made of a two-character status code followed
//! directly by a path (`XY path`). Rename and copy records carry a second
//! path in the *next* NUL-delimited token.
//!
//! # Record Format
//!
//! ```text
//! " M src/lib.rs\0"            modified in the work tree
//! "?? notes.txt\0"             untracked
//! "D  old/file.rs\0"           deleted in the index
//! "R  new.rs\0old.rs\0"        renamed; destination first, then source
//! ```
//!
//! The pair order for renames follows Git's `-z` convention (destination,
//! then source). Paths are always consumed in pairs and never re-split.
//!
//! # Example
//!
//! ```
//! use livediff_tracker::status::{parse_status_entries, ChangeClass};
//!
//! let entries = parse_status_entries(b"?? new.txt\0 M src/lib.rs\0");
//! assert_eq!(entries.len(), 2);
//! assert_eq!(entries[0].classify(), ChangeClass::Created);
//! assert_eq!(entries[1].classify(), ChangeClass::ModifiedLike);
//! ```

use std::path::PathBuf;

use bitflags::bitflags;
use tracing::trace;

bitflags! {
    /// Flags derived from the two status columns of a record.
    ///
    /// Both columns contribute: a record like `AM` is both `ADDED` and
    /// `MODIFIED`. [`StatusEntry::classify`] reduces the set to a single
    /// primary classification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusFlags: u8 {
        const UNTRACKED = 0b0000_0001;
        const ADDED = 0b0000_0010;
        const DELETED = 0b0000_0100;
        const MODIFIED = 0b0000_1000;
        const TYPE_CHANGED = 0b0001_0000;
        const UNMERGED = 0b0010_0000;
        const RENAME_OR_COPY = 0b0100_0000;
    }
}

impl StatusFlags {
    /// Builds the flag set for a two-character status code.
    ///
    /// Unknown characters (including the space and `!` for ignored files)
    /// contribute no flags.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        let mut flags = Self::empty();
        for c in code.chars() {
            flags |= match c {
                '?' => Self::UNTRACKED,
                'A' => Self::ADDED,
                'D' => Self::DELETED,
                'M' => Self::MODIFIED,
                'T' => Self::TYPE_CHANGED,
                'U' => Self::UNMERGED,
                'R' | 'C' => Self::RENAME_OR_COPY,
                _ => Self::empty(),
            };
        }
        flags
    }
}

/// Primary classification of a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeClass {
    /// Rename or copy; carries both a source and a destination path.
    RenameOrCopy,
    /// Untracked or newly added file.
    Created,
    /// Deleted file.
    Deleted,
    /// Modified, type-changed, or unmerged file.
    ModifiedLike,
    /// No recognised flags (e.g. ignored files).
    Unknown,
}

/// One parsed status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path relative to the repository root. For renames and copies this is
    /// the destination.
    pub path: PathBuf,

    /// Source path for renames and copies.
    pub renamed_from: Option<PathBuf>,

    /// The raw two-character status code.
    pub code: String,

    pub flags: StatusFlags,
}

impl StatusEntry {
    /// Creates an entry from a status code and path.
    #[must_use]
    pub fn new(code: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            renamed_from: None,
            code: code.to_string(),
            flags: StatusFlags::from_code(code),
        }
    }

    /// Creates a rename/copy entry.
    #[must_use]
    pub fn renamed(code: &str, to: impl Into<PathBuf>, from: impl Into<PathBuf>) -> Self {
        Self {
            renamed_from: Some(from.into()),
            ..Self::new(code, to)
        }
    }

    /// Reduces the flag set to a single classification.
    ///
    /// Precedence: rename/copy, then untracked/added, then deleted, then
    /// modified/type-changed/unmerged.
    #[must_use]
    pub fn classify(&self) -> ChangeClass {
        let flags = self.flags;
        if flags.contains(StatusFlags::RENAME_OR_COPY) {
            ChangeClass::RenameOrCopy
        } else if flags.intersects(StatusFlags::UNTRACKED | StatusFlags::ADDED) {
            ChangeClass::Created
        } else if flags.contains(StatusFlags::DELETED) {
            ChangeClass::Deleted
        } else if flags
            .intersects(StatusFlags::MODIFIED | StatusFlags::TYPE_CHANGED | StatusFlags::UNMERGED)
        {
            ChangeClass::ModifiedLike
        } else {
            ChangeClass::Unknown
        }
    }
}

/// Parses NUL-delimited status output into entries.
///
/// Empty or whitespace-only input yields an empty vector, which callers treat
/// as "no changes" rather than an error. Tokens shorter than three bytes are
/// skipped. Invalid UTF-8 in paths is replaced lossily.
///
/// Rename and copy records use the order `git status -z` emits: the record's
/// own path is the destination and the following token is the source
/// (`"R  new\0old\0"`). Backends producing status output for this parser
/// must follow the same order.
///
/// # Example
///
/// ```
/// use livediff_tracker::status::parse_status_entries;
///
/// let entries = parse_status_entries(b"R  new.txt\0old.txt\0");
/// assert_eq!(entries.len(), 1);
/// assert_eq!(entries[0].path.to_str(), Some("new.txt"));
/// assert_eq!(entries[0].renamed_from.as_deref().and_then(|p| p.to_str()), Some("old.txt"));
///
/// assert!(parse_status_entries(b"").is_empty());
/// assert!(parse_status_entries(b"  \n ").is_empty());
/// ```
#[must_use]
pub fn parse_status_entries(raw: &[u8]) -> Vec<StatusEntry> {
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut entries = Vec::new();
    let mut tokens = text.split('\0');

    while let Some(token) = tokens.next() {
        if token.is_empty() {
            continue;
        }
        if token.len() < 3 || !token.is_char_boundary(2) {
            trace!(token, "Skipping short status token");
            continue;
        }

        // "XY" is followed by a separating space in porcelain output.
        let (code, rest) = token.split_at(2);
        let path = rest.strip_prefix(' ').unwrap_or(rest);
        if path.is_empty() {
            continue;
        }

        let flags = StatusFlags::from_code(code);
        let entry = if flags.contains(StatusFlags::RENAME_OR_COPY) {
            match tokens.next().filter(|t| !t.is_empty()) {
                Some(from) => StatusEntry::renamed(code, path, from),
                None => StatusEntry::new(code, path),
            }
        } else {
            StatusEntry::new(code, path)
        };

        entries.push(entry);
    }

    entries
}

/// Returns true if the raw status output reports a clean working tree.
#[must_use]
pub fn is_clean(raw: &[u8]) -> bool {
    parse_status_entries(raw).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Flag parsing
    // =========================================================================

    #[test]
    fn flags_from_single_column_codes() {
        assert_eq!(StatusFlags::from_code(" M"), StatusFlags::MODIFIED);
        assert_eq!(StatusFlags::from_code("D "), StatusFlags::DELETED);
        assert_eq!(StatusFlags::from_code("??"), StatusFlags::UNTRACKED);
        assert_eq!(StatusFlags::from_code(" T"), StatusFlags::TYPE_CHANGED);
        assert_eq!(StatusFlags::from_code("UU"), StatusFlags::UNMERGED);
        assert_eq!(StatusFlags::from_code("R "), StatusFlags::RENAME_OR_COPY);
        assert_eq!(StatusFlags::from_code("C "), StatusFlags::RENAME_OR_COPY);
    }

    #[test]
    fn flags_combine_both_columns() {
        let flags = StatusFlags::from_code("AM");
        assert!(flags.contains(StatusFlags::ADDED));
        assert!(flags.contains(StatusFlags::MODIFIED));
    }

    #[test]
    fn ignored_code_has_no_flags() {
        assert!(StatusFlags::from_code("!!").is_empty());
    }

    // =========================================================================
    // Classification precedence
    // =========================================================================

    #[test]
    fn rename_takes_precedence() {
        let entry = StatusEntry::renamed("RM", "b.rs", "a.rs");
        assert_eq!(entry.classify(), ChangeClass::RenameOrCopy);
    }

    #[test]
    fn added_beats_modified() {
        assert_eq!(StatusEntry::new("AM", "x").classify(), ChangeClass::Created);
    }

    #[test]
    fn added_beats_deleted() {
        assert_eq!(StatusEntry::new("AD", "x").classify(), ChangeClass::Created);
    }

    #[test]
    fn deleted_beats_modified() {
        assert_eq!(StatusEntry::new("MD", "x").classify(), ChangeClass::Deleted);
    }

    #[test]
    fn modified_like_covers_type_change_and_unmerged() {
        assert_eq!(StatusEntry::new(" M", "x").classify(), ChangeClass::ModifiedLike);
        assert_eq!(StatusEntry::new(" T", "x").classify(), ChangeClass::ModifiedLike);
        assert_eq!(StatusEntry::new("UU", "x").classify(), ChangeClass::ModifiedLike);
    }

    #[test]
    fn ignored_is_unknown() {
        assert_eq!(StatusEntry::new("!!", "x").classify(), ChangeClass::Unknown);
    }

    // =========================================================================
    // Record parsing
    // =========================================================================

    #[test]
    fn empty_input_yields_no_entries() {
        assert!(parse_status_entries(b"").is_empty());
        assert!(is_clean(b""));
    }

    #[test]
    fn whitespace_input_yields_no_entries() {
        assert!(parse_status_entries(b"   \n\t").is_empty());
    }

    #[test]
    fn untracked_file() {
        let entries = parse_status_entries(b"?? new.txt\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("new.txt"));
        assert_eq!(entries[0].code, "??");
        assert_eq!(entries[0].classify(), ChangeClass::Created);
    }

    #[test]
    fn entry_count_matches_non_empty_tokens() {
        let raw = b" M a.rs\0D  b.rs\0?? c.rs\0A  d.rs\0";
        let entries = parse_status_entries(raw);
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn rename_consumes_following_token() {
        let raw = b"R  new.txt\0old.txt\0 M other.rs\0";
        let entries = parse_status_entries(raw);

        // Three non-empty tokens, one of which is the rename source.
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("new.txt"));
        assert_eq!(entries[0].renamed_from, Some(PathBuf::from("old.txt")));
        assert_eq!(entries[1].path, PathBuf::from("other.rs"));
        assert_eq!(entries[1].renamed_from, None);
    }

    #[test]
    fn copy_consumes_following_token() {
        let entries = parse_status_entries(b"C  copy.rs\0orig.rs\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].renamed_from, Some(PathBuf::from("orig.rs")));
    }

    #[test]
    fn rename_source_that_looks_like_a_record_is_not_resplit() {
        // A source path that itself starts with a status-like prefix must be
        // taken verbatim.
        let entries = parse_status_entries(b"R  b.rs\0?? a.rs\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].renamed_from, Some(PathBuf::from("?? a.rs")));
    }

    #[test]
    fn truncated_rename_keeps_destination() {
        let entries = parse_status_entries(b"R  new.txt\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].renamed_from, None);
    }

    #[test]
    fn short_tokens_are_skipped() {
        let entries = parse_status_entries(b"M\0??\0 M ok.rs\0");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("ok.rs"));
    }

    #[test]
    fn paths_with_spaces_are_preserved() {
        let entries = parse_status_entries(b" M dir with space/file name.rs\0");
        assert_eq!(entries[0].path, PathBuf::from("dir with space/file name.rs"));
    }

    #[test]
    fn missing_trailing_nul_is_tolerated() {
        let entries = parse_status_entries(b" M a.rs\0 M b.rs");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn dirty_output_is_not_clean() {
        assert!(!is_clean(b" M a.rs\0"));
    }
}
