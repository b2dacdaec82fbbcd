//! Integration tests against a real `git` repository.
//!
//! Each test creates a scratch repository in a temporary directory. Tests
//! return early when no `git` executable is available.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tempfile::TempDir;

use livediff_tracker::vcs::{GitBackend, HistoryBackend};
use livediff_tracker::{
    parse_status_entries, resolve_repository_root, ChangeClass, ChangeTracker, ChangeType, Config,
    PollOutcome,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .expect("Failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

/// Creates a repository with one commit containing `files`.
fn create_repo(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let root = temp.path().canonicalize().expect("Failed to canonicalize");

    git(&root, &["init", "-q"]);
    git(&root, &["config", "commit.gpgsign", "false"]);
    for (path, content) in files {
        write_file(&root, path, content);
    }
    git(&root, &["add", "-A"]);
    git(&root, &["commit", "-q", "-m", "initial"]);
    (temp, root)
}

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

fn test_config() -> Config {
    Config {
        poll_interval: Duration::from_secs(3600),
        ..Config::default()
    }
}

// ============================================================================
// Backend
// ============================================================================

#[tokio::test]
async fn backend_reports_status_content_and_head() {
    if !git_available() {
        return;
    }
    let (_temp, root) = create_repo(&[("a.txt", "one\n")]);
    write_file(&root, "a.txt", "two\n");
    write_file(&root, "new file.txt", "x\n");

    let backend = GitBackend::default();
    let raw = backend.status(&root).await.unwrap();
    let mut entries = parse_status_entries(&raw);
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path, PathBuf::from("a.txt"));
    assert_eq!(entries[0].classify(), ChangeClass::ModifiedLike);
    assert_eq!(entries[1].path, PathBuf::from("new file.txt"));
    assert_eq!(entries[1].classify(), ChangeClass::Created);

    let original = backend.show(&root, "HEAD", Path::new("a.txt")).await.unwrap();
    assert_eq!(original, b"one\n");

    let head = backend.head_revision(&root).await.expect("HEAD exists");
    assert_eq!(head.len(), 40);

    assert!(backend
        .show(&root, "HEAD", Path::new("missing.txt"))
        .await
        .is_err());
}

#[tokio::test]
async fn unborn_head_has_no_revision() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    git(temp.path(), &["init", "-q"]);

    let backend = GitBackend::default();
    assert_eq!(backend.head_revision(temp.path()).await, None);
}

#[tokio::test]
async fn resolves_root_from_subdirectory() {
    if !git_available() {
        return;
    }
    let (_temp, root) = create_repo(&[("src/deep/a.rs", "fn a() {}\n")]);
    assert_eq!(resolve_repository_root(&root.join("src/deep")), Some(root));
}

// ============================================================================
// Tracking
// ============================================================================

#[tokio::test]
async fn tracks_working_tree_changes() {
    if !git_available() {
        return;
    }
    let (_temp, root) = create_repo(&[
        ("src/lib.rs", "pub fn a() {}\npub fn b() {}\n"),
        ("gone.txt", "bye\n"),
        ("target/debug.log", "noise\n"),
    ]);
    write_file(&root, "src/lib.rs", "pub fn a() {}\npub fn c() {}\n");
    write_file(&root, "notes.md", "# notes\n");
    write_file(&root, "target/debug.log", "more noise\n");
    fs::remove_file(root.join("gone.txt")).unwrap();

    let tracker = ChangeTracker::new(test_config());
    tracker.start_tracking(&root).await.unwrap();
    let mut files = tracker.get_changed_files().await;
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let summary: Vec<(&str, ChangeType, usize, usize)> = files
        .iter()
        .map(|f| {
            (
                f.relative_path.to_str().unwrap(),
                f.change_type,
                f.lines_added,
                f.lines_removed,
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("gone.txt", ChangeType::Deleted, 0, 1),
            ("notes.md", ChangeType::Created, 1, 0),
            ("src/lib.rs", ChangeType::Modified, 1, 1),
        ]
    );

    tracker.stop_tracking().await;
}

#[tokio::test]
async fn staged_rename_is_reported_once() {
    if !git_available() {
        return;
    }
    let body: String = (1..=10).map(|i| format!("line {i}\n")).collect();
    let (_temp, root) = create_repo(&[("old.txt", body.as_str())]);
    git(&root, &["mv", "old.txt", "new.txt"]);

    let tracker = ChangeTracker::new(test_config());
    tracker.start_tracking(&root).await.unwrap();
    let files = tracker.get_changed_files().await;

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].change_type, ChangeType::Renamed);
    assert_eq!(files[0].relative_path, PathBuf::from("new.txt"));
    assert_eq!(files[0].renamed_from, Some(PathBuf::from("old.txt")));
    assert_eq!(files[0].total_changes(), 0);
}

#[tokio::test]
async fn commit_triggers_auto_reset() {
    if !git_available() {
        return;
    }
    let (_temp, root) = create_repo(&[("a.txt", "one\n")]);
    write_file(&root, "a.txt", "two\n");

    let tracker = ChangeTracker::new(test_config());
    tracker.start_tracking(&root).await.unwrap();
    assert_eq!(tracker.get_changed_files().await.len(), 1);
    let before = tracker.baseline().unwrap().head().map(str::to_owned);

    git(&root, &["commit", "-q", "-am", "second"]);

    assert_eq!(tracker.poll_tick().await, PollOutcome::AutoReset);
    assert!(tracker.get_changed_files().await.is_empty());
    assert!(tracker.baseline_from_vcs());
    let after = tracker.baseline().unwrap().head().map(str::to_owned);
    assert_ne!(before, after);

    // Edits after the commit diff against the new HEAD.
    write_file(&root, "a.txt", "three\n");
    assert_eq!(tracker.poll_tick().await, PollOutcome::Refreshed);
    let files = tracker.get_changed_files().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].lines[0].text, "two");

    tracker.stop_tracking().await;
}
