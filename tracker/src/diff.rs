//! Collapsed line-level diff computation.
//!
//! The diff is produced in two passes:
//!
//! 1. Both texts are split into lines and a minimal line diff is computed
//!    with [`similar`] (Myers, bounded by a deadline for pathological
//!    inputs). The result is flattened into one row per line.
//! 2. Rows within `context_lines` of a change are kept; every maximal run of
//!    unkept unchanged rows is replaced by a single
//!    [`DiffLineType::Elided`](crate::types::DiffLineType::Elided) marker.
//!
//! An unchanged run between two changes is therefore emitted in full when it
//! is at most `2 × context_lines` long, and collapsed to
//! `context + marker + context` otherwise. Leading and trailing unchanged runs
//! keep only the context adjacent to the first/last change.
//!
//! # Example
//!
//! ```
//! use livediff_tracker::diff::compute_diff;
//! use livediff_tracker::types::DiffLineType;
//!
//! let original = "a\nb\nc\n";
//! let current = "a\nB\nc\n";
//! let diff = compute_diff(original, current, 3);
//!
//! assert_eq!(diff.lines_added, 1);
//! assert_eq!(diff.lines_removed, 1);
//! assert_eq!(diff.lines[1].line_type, DiffLineType::Removed);
//! assert_eq!(diff.lines[2].line_type, DiffLineType::Added);
//! ```

use std::time::{Duration, Instant};

use similar::{capture_diff_slices_deadline, Algorithm, DiffTag};

use crate::types::DiffLine;

/// Default number of context lines around each change.
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Upper bound on time spent in the line diff before falling back to a
/// coarser (still correct) result.
const DIFF_DEADLINE: Duration = Duration::from_secs(2);

/// Output of the diff computer for one file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileDiff {
    pub lines: Vec<DiffLine>,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl FileDiff {
    /// Returns true if the two inputs had identical lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines_added == 0 && self.lines_removed == 0
    }
}

/// One line of the flattened first-pass diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row<'a> {
    Equal { old: usize, new: usize, text: &'a str },
    Delete { old: usize, text: &'a str },
    Insert { new: usize, text: &'a str },
}

impl Row<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Row::Equal { .. })
    }

    fn to_diff_line(self) -> DiffLine {
        // Row indices are 0-based; emitted line numbers are 1-based.
        match self {
            Row::Equal { old, new, text } => DiffLine::context(text, old + 1, new + 1),
            Row::Delete { old, text } => DiffLine::removed(text, old + 1),
            Row::Insert { new, text } => DiffLine::added(text, new + 1),
        }
    }
}

/// Splits text into lines, accepting both `\n` and `\r\n` terminators.
fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// First pass: minimal line diff flattened into rows.
fn diff_rows<'a>(old_lines: &[&'a str], new_lines: &[&'a str]) -> Vec<Row<'a>> {
    let deadline = Instant::now() + DIFF_DEADLINE;
    let ops = capture_diff_slices_deadline(Algorithm::Myers, old_lines, new_lines, Some(deadline));

    let mut rows = Vec::with_capacity(old_lines.len().max(new_lines.len()));
    for op in ops {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        match tag {
            DiffTag::Equal => {
                for (old, new) in old_range.zip(new_range) {
                    rows.push(Row::Equal {
                        old,
                        new,
                        text: new_lines[new],
                    });
                }
            }
            DiffTag::Delete => {
                for old in old_range {
                    rows.push(Row::Delete {
                        old,
                        text: old_lines[old],
                    });
                }
            }
            DiffTag::Insert => {
                for new in new_range {
                    rows.push(Row::Insert {
                        new,
                        text: new_lines[new],
                    });
                }
            }
            DiffTag::Replace => {
                for old in old_range {
                    rows.push(Row::Delete {
                        old,
                        text: old_lines[old],
                    });
                }
                for new in new_range {
                    rows.push(Row::Insert {
                        new,
                        text: new_lines[new],
                    });
                }
            }
        }
    }
    rows
}

/// Second pass: keep rows near changes and collapse the rest.
fn collapse(rows: &[Row<'_>], context_lines: usize) -> Vec<DiffLine> {
    let mut keep = vec![false; rows.len()];
    for (i, row) in rows.iter().enumerate() {
        if row.is_change() {
            let start = i.saturating_sub(context_lines);
            let end = (i + context_lines).min(rows.len() - 1);
            keep[start..=end].iter_mut().for_each(|k| *k = true);
        }
    }

    let mut out = Vec::new();
    let mut hidden = 0usize;
    for (row, kept) in rows.iter().zip(&keep) {
        if *kept {
            if hidden > 0 {
                out.push(DiffLine::elided(hidden));
                hidden = 0;
            }
            out.push(row.to_diff_line());
        } else {
            hidden += 1;
        }
    }
    if hidden > 0 {
        out.push(DiffLine::elided(hidden));
    }
    out
}

/// Computes a collapsed diff between `original` and `current`.
///
/// Identical inputs produce an empty [`FileDiff`]. An empty `original`
/// produces every current line as added; an empty `current` produces every
/// original line as removed.
///
/// # Arguments
///
/// * `original` - Baseline content
/// * `current` - Current on-disk content
/// * `context_lines` - Unchanged lines to keep on each side of a change
#[must_use]
pub fn compute_diff(original: &str, current: &str, context_lines: usize) -> FileDiff {
    let old_lines = split_lines(original);
    let new_lines = split_lines(current);
    let rows = diff_rows(&old_lines, &new_lines);

    let lines_added = rows.iter().filter(|r| matches!(r, Row::Insert { .. })).count();
    let lines_removed = rows.iter().filter(|r| matches!(r, Row::Delete { .. })).count();
    if lines_added == 0 && lines_removed == 0 {
        return FileDiff::default();
    }

    FileDiff {
        lines: collapse(&rows, context_lines),
        lines_added,
        lines_removed,
    }
}

/// Computes a diff without collapsing any unchanged runs.
///
/// Every line of both inputs appears exactly once, which makes the output
/// suitable for reconstructing either side.
#[must_use]
pub fn compute_full_diff(original: &str, current: &str) -> FileDiff {
    let old_lines = split_lines(original);
    let new_lines = split_lines(current);
    let rows = diff_rows(&old_lines, &new_lines);

    FileDiff {
        lines_added: rows.iter().filter(|r| matches!(r, Row::Insert { .. })).count(),
        lines_removed: rows.iter().filter(|r| matches!(r, Row::Delete { .. })).count(),
        lines: rows.into_iter().map(Row::to_diff_line).collect(),
    }
}

/// Emits every line of `current` as added.
///
/// Used for created files and for files whose original is unavailable.
#[must_use]
pub fn all_added(current: &str) -> FileDiff {
    let lines: Vec<DiffLine> = split_lines(current)
        .into_iter()
        .enumerate()
        .map(|(i, text)| DiffLine::added(text, i + 1))
        .collect();
    FileDiff {
        lines_added: lines.len(),
        lines_removed: 0,
        lines,
    }
}

/// Emits every line of `original` as removed.
///
/// Used for deleted files.
#[must_use]
pub fn all_removed(original: &str) -> FileDiff {
    let lines: Vec<DiffLine> = split_lines(original)
        .into_iter()
        .enumerate()
        .map(|(i, text)| DiffLine::removed(text, i + 1))
        .collect();
    FileDiff {
        lines_added: 0,
        lines_removed: lines.len(),
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiffLineType;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    fn reconstruct(diff: &FileDiff, keep: DiffLineType) -> Vec<String> {
        diff.lines
            .iter()
            .filter(|l| l.line_type == DiffLineType::Context || l.line_type == keep)
            .map(|l| l.text.clone())
            .collect()
    }

    fn lines_of(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    // =========================================================================
    // Basic cases
    // =========================================================================

    #[test]
    fn identical_inputs_produce_no_lines() {
        let text = numbered(20);
        let diff = compute_diff(&text, &text, 3);
        assert!(diff.is_empty());
        assert!(diff.lines.is_empty());
    }

    #[test]
    fn both_empty() {
        assert!(compute_diff("", "", 3).is_empty());
    }

    #[test]
    fn empty_original_is_all_added() {
        let diff = compute_diff("", "a\nb\n", 3);
        assert_eq!(diff.lines_added, 2);
        assert_eq!(diff.lines_removed, 0);
        assert!(diff.lines.iter().all(|l| l.line_type == DiffLineType::Added));
    }

    #[test]
    fn empty_current_is_all_removed() {
        let diff = compute_diff("a\nb\n", "", 3);
        assert_eq!(diff.lines_removed, 2);
        assert!(diff.lines.iter().all(|l| l.line_type == DiffLineType::Removed));
    }

    #[test]
    fn single_line_replacement_has_line_numbers() {
        let diff = compute_diff("a\nb\nc\n", "a\nX\nc\n", 3);

        assert_eq!(diff.lines.len(), 4);
        assert_eq!(diff.lines[0], DiffLine::context("a", 1, 1));
        assert_eq!(diff.lines[1], DiffLine::removed("b", 2));
        assert_eq!(diff.lines[2], DiffLine::added("X", 2));
        assert_eq!(diff.lines[3], DiffLine::context("c", 3, 3));
    }

    #[test]
    fn crlf_and_lf_lines_compare_equal() {
        let diff = compute_diff("a\r\nb\r\n", "a\nb\n", 3);
        assert!(diff.is_empty());
    }

    #[test]
    fn trailing_newline_difference_is_ignored() {
        let diff = compute_diff("a\nb", "a\nb\n", 3);
        assert!(diff.is_empty());
    }

    // =========================================================================
    // Context collapsing
    // =========================================================================

    #[test]
    fn single_change_in_large_file_is_bounded() {
        let original = numbered(1000);
        let current = original.replace("line 500\n", "changed\n");
        let diff = compute_diff(&original, &current, 3);

        // 3 context + removed + added + 3 context + two elision markers.
        assert_eq!(diff.lines.len(), 10);
        assert!(diff.lines.len() <= 2 * 3 + 2 + 2);
        assert!(diff.lines[0].is_elided());
        assert_eq!(diff.lines[0].elided_count, 496);
        assert!(diff.lines[9].is_elided());
        assert_eq!(diff.lines[9].elided_count, 497);
    }

    #[test]
    fn short_gap_between_changes_is_kept_in_full() {
        // Changes at lines 1 and 8, gap of 6 unchanged lines == 2 * context.
        let original = numbered(8);
        let current = original
            .replace("line 1\n", "first\n")
            .replace("line 8\n", "last\n");
        let diff = compute_diff(&original, &current, 3);

        assert!(diff.lines.iter().all(|l| !l.is_elided()));
        let context = diff
            .lines
            .iter()
            .filter(|l| l.line_type == DiffLineType::Context)
            .count();
        assert_eq!(context, 6);
    }

    #[test]
    fn long_gap_between_changes_gets_one_marker() {
        // Changes at lines 1 and 9, gap of 7 > 2 * context.
        let original = numbered(9);
        let current = original
            .replace("line 1\n", "first\n")
            .replace("line 9\n", "last\n");
        let diff = compute_diff(&original, &current, 3);

        let markers: Vec<_> = diff.lines.iter().filter(|l| l.is_elided()).collect();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].elided_count, 1);
    }

    #[test]
    fn zero_context_keeps_only_changes() {
        let original = numbered(10);
        let current = original.replace("line 5\n", "five\n");
        let diff = compute_diff(&original, &current, 0);

        let kinds: Vec<_> = diff.lines.iter().map(|l| l.line_type).collect();
        assert_eq!(
            kinds,
            vec![
                DiffLineType::Elided,
                DiffLineType::Removed,
                DiffLineType::Added,
                DiffLineType::Elided,
            ]
        );
    }

    // =========================================================================
    // Reconstruction
    // =========================================================================

    #[test]
    fn full_diff_reconstructs_both_sides() {
        let original = "fn a() {}\nfn b() {}\nfn c() {}\nlet x = 1;\n";
        let current = "fn a() {}\nfn c() {}\nfn d() {}\nlet x = 2;\nlet y = 3;\n";
        let diff = compute_full_diff(original, current);

        assert_eq!(reconstruct(&diff, DiffLineType::Added), lines_of(current));
        assert_eq!(reconstruct(&diff, DiffLineType::Removed), lines_of(original));
    }

    #[test]
    fn full_diff_reconstructs_many_shapes() {
        let cases = [
            ("", ""),
            ("", "a\nb"),
            ("a\nb", ""),
            ("a\nb\nc", "c\nb\na"),
            ("x\nx\nx", "x\nx"),
            ("a\nb\nc\nd\ne", "a\nc\ne\nf"),
            ("same\n", "same\n"),
        ];
        for (original, current) in cases {
            let diff = compute_full_diff(original, current);
            assert_eq!(
                reconstruct(&diff, DiffLineType::Added),
                lines_of(current),
                "current side for {original:?} -> {current:?}"
            );
            assert_eq!(
                reconstruct(&diff, DiffLineType::Removed),
                lines_of(original),
                "original side for {original:?} -> {current:?}"
            );
        }
    }

    #[test]
    fn swapping_inputs_swaps_counts() {
        let cases = [
            ("a\nb\nc", "a\nc\nd\ne"),
            ("", "one\ntwo"),
            ("x\ny\nx\ny", "y\nx"),
        ];
        for (original, current) in cases {
            let forward = compute_full_diff(original, current);
            let backward = compute_full_diff(current, original);
            assert_eq!(forward.lines_added, backward.lines_removed);
            assert_eq!(forward.lines_removed, backward.lines_added);
        }
    }

    #[test]
    fn collapsed_diff_without_elision_reconstructs() {
        let original = "a\nb\nc\nd\n";
        let current = "a\nB\nc\nD\n";
        let diff = compute_diff(original, current, 3);

        assert!(diff.lines.iter().all(|l| !l.is_elided()));
        assert_eq!(reconstruct(&diff, DiffLineType::Added), lines_of(current));
        assert_eq!(reconstruct(&diff, DiffLineType::Removed), lines_of(original));
    }

    #[test]
    fn elided_counts_account_for_every_hidden_line() {
        let original = numbered(200);
        let current = original
            .replace("line 20\n", "twenty\n")
            .replace("line 150\n", "one-fifty\n");
        let diff = compute_diff(&original, &current, 3);

        let shown_context = diff
            .lines
            .iter()
            .filter(|l| l.line_type == DiffLineType::Context)
            .count();
        let hidden: usize = diff.lines.iter().map(|l| l.elided_count).sum();
        assert_eq!(shown_context + hidden, 198);
    }

    // =========================================================================
    // Whole-file helpers
    // =========================================================================

    #[test]
    fn all_added_numbers_current_lines() {
        let diff = all_added("one\ntwo\n");
        assert_eq!(diff.lines_added, 2);
        assert_eq!(diff.lines[1], DiffLine::added("two", 2));
    }

    #[test]
    fn all_removed_numbers_original_lines() {
        let diff = all_removed("one\ntwo\nthree");
        assert_eq!(diff.lines_removed, 3);
        assert_eq!(diff.lines[2], DiffLine::removed("three", 3));
    }

    #[test]
    fn all_added_of_empty_file_is_empty() {
        let diff = all_added("");
        assert!(diff.lines.is_empty());
        assert_eq!(diff.lines_added, 0);
    }
}
