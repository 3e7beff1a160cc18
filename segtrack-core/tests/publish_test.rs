//! Publishing against real git repositories in scratch directories.
//!
//! Skipped when no `git` binary is on PATH.

use chrono::{TimeZone, Utc};
use segtrack_core::config::{PathSettings, PublishSettings};
use segtrack_core::publish::{artifacts, GitPublisher, PublishError, PublishOutcome};
use std::fs;
use std::path::Path;
use std::process::Command;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn identify(dir: &Path) {
    git(dir, &["config", "user.email", "tracker@example.com"]);
    git(dir, &["config", "user.name", "Tracker"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// Repository with one initial commit and a committer identity.
fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    identify(dir);
    fs::write(dir.join("README.md"), "segments\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "init"]);
}

fn commit_count(dir: &Path) -> usize {
    git(dir, &["rev-list", "--count", "HEAD"]).trim().parse().unwrap()
}

fn local_only() -> PublishSettings {
    PublishSettings {
        push: false,
        ..PublishSettings::default()
    }
}

fn write_artifacts(dir: &Path, log: &str) {
    fs::write(dir.join("all_segments_log.csv"), log).unwrap();
    fs::create_dir_all(dir.join("plots")).unwrap();
    fs::write(dir.join("plots/segment_1_plot.png"), b"\x89PNG fake").unwrap();
}

#[test]
fn nothing_to_stage_makes_no_commit() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let publisher = GitPublisher::new(dir.path(), local_only());
    let outcome = publisher
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap();

    assert_eq!(outcome, PublishOutcome::NoChanges);
    assert_eq!(commit_count(dir.path()), 1);
}

#[test]
fn changed_artifacts_make_exactly_one_commit() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write_artifacts(dir.path(), "segment_id\n");
    fs::write(dir.path().join("plots/notes.txt"), "not a plot").unwrap();

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 15, 3).unwrap();
    let publisher = GitPublisher::new(dir.path(), local_only());
    let outcome = publisher
        .publish(&artifacts(&PathSettings::default()), now)
        .unwrap();

    assert_eq!(
        outcome,
        PublishOutcome::Committed {
            message: "Update Strava segment data 2024-06-01 09:15:03 UTC".into(),
            pushed: false,
        }
    );
    assert_eq!(commit_count(dir.path()), 2);

    let files = git(dir.path(), &["show", "--name-only", "--format=", "HEAD"]);
    assert!(files.contains("all_segments_log.csv"));
    assert!(files.contains("plots/segment_1_plot.png"));
    assert!(!files.contains("notes.txt"));

    // Same content again: nothing new.
    let again = publisher
        .publish(&artifacts(&PathSettings::default()), now)
        .unwrap();
    assert_eq!(again, PublishOutcome::NoChanges);
    assert_eq!(commit_count(dir.path()), 2);
}

#[test]
fn missing_log_is_tolerated() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    fs::create_dir_all(dir.path().join("plots")).unwrap();
    fs::write(dir.path().join("plots/segment_7_plot.png"), b"png").unwrap();

    let publisher = GitPublisher::new(dir.path(), local_only());
    let outcome = publisher
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap();

    assert!(matches!(outcome, PublishOutcome::Committed { pushed: false, .. }));
}

#[test]
fn pushes_to_tracking_remote() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = root.path().join("remote.git");
    let work = root.path().join("work");
    fs::create_dir_all(&remote).unwrap();
    fs::create_dir_all(&work).unwrap();

    git(&remote, &["init", "-q", "--bare"]);
    init_repo(&work);
    git(&work, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&work, &["push", "-q", "-u", "origin", "HEAD"]);

    write_artifacts(&work, "segment_id\n1\n");
    let publisher = GitPublisher::new(&work, PublishSettings::default());
    let outcome = publisher
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap();
    assert!(matches!(outcome, PublishOutcome::Committed { pushed: true, .. }));

    let remote_log = git(&remote, &["log", "--oneline", "--all"]);
    assert!(remote_log.contains("Update Strava segment data"));
}

#[test]
fn push_without_remote_reports_git_failure() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    write_artifacts(dir.path(), "segment_id\n");

    let publisher = GitPublisher::new(dir.path(), PublishSettings::default());
    let err = publisher
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap_err();

    assert!(matches!(err, PublishError::Git { .. }), "got {err:?}");
    // The commit itself landed before the push step failed.
    assert_eq!(commit_count(dir.path()), 2);
}

#[test]
fn conflicting_upstream_leaves_branch_clean() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = root.path().join("remote.git");
    let first = root.path().join("first");
    let second = root.path().join("second");
    fs::create_dir_all(&remote).unwrap();
    fs::create_dir_all(&first).unwrap();

    git(&remote, &["init", "-q", "--bare"]);
    init_repo(&first);
    git(&first, &["remote", "add", "origin", remote.to_str().unwrap()]);
    git(&first, &["push", "-q", "-u", "origin", "HEAD"]);
    git(
        root.path(),
        &["clone", "-q", remote.to_str().unwrap(), second.to_str().unwrap()],
    );
    identify(&second);

    write_artifacts(&first, "segment_id\n1\n");
    GitPublisher::new(&first, PublishSettings::default())
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap();

    // Same files, different content: the rebase cannot apply.
    write_artifacts(&second, "segment_id\n2\n");
    let publisher = GitPublisher::new(&second, PublishSettings::default());
    let err = publisher
        .publish(&artifacts(&PathSettings::default()), Utc::now())
        .unwrap_err();
    assert!(matches!(err, PublishError::Git { ref command, .. } if command == "pull --rebase"));

    assert!(!second.join(".git/rebase-merge").exists());
    assert!(!second.join(".git/rebase-apply").exists());
    assert_eq!(git(&second, &["status", "--porcelain"]).trim(), "");
    git(&second, &["symbolic-ref", "-q", "HEAD"]);
    assert_eq!(commit_count(&second), 2);
    assert_eq!(
        fs::read_to_string(second.join("all_segments_log.csv")).unwrap(),
        "segment_id\n2\n"
    );

    // The next attempt fails the same way instead of on a detached HEAD.
    fs::write(second.join("all_segments_log.csv"), "segment_id\n2\n3\n").unwrap();
    match publisher.publish(&artifacts(&PathSettings::default()), Utc::now()) {
        Err(PublishError::Git { command, stderr, .. }) => {
            assert_eq!(command, "pull --rebase");
            assert!(!stderr.contains("not currently on a branch"));
        }
        other => panic!("expected pull failure, got {other:?}"),
    }
}
