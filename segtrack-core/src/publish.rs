//! Commit updated artifacts back to the repository.
//!
//! Mirrors the job's final step: stage the log and the plot images, commit
//! once if anything changed, then push. A path that does not exist yet (first
//! run) is skipped rather than failing the stage step.

use crate::config::{PathSettings, PublishSettings};
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to run `git {command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` exited with {}: {stderr}", .code.map_or("signal".to_string(), |c| c.to_string()))]
    Git {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// What a publish attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing staged differed from HEAD; no commit was made.
    NoChanges,
    Committed { message: String, pushed: bool },
}

/// One artifact location to stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(PathBuf),
    /// Every `*.png` directly inside the directory.
    PngDir(PathBuf),
}

/// The log file and plot directory from the configured paths.
pub fn artifacts(paths: &PathSettings) -> Vec<Artifact> {
    vec![
        Artifact::File(paths.log_file.clone()),
        Artifact::PngDir(paths.plot_dir.clone()),
    ]
}

/// Timestamped commit message.
pub fn commit_message(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix} {} UTC", now.format("%Y-%m-%d %H:%M:%S"))
}

/// Runs git in a working tree.
pub struct GitPublisher {
    repo: PathBuf,
    settings: PublishSettings,
}

impl GitPublisher {
    pub fn new(repo: impl Into<PathBuf>, settings: PublishSettings) -> Self {
        Self {
            repo: repo.into(),
            settings,
        }
    }

    /// Stage `artifacts`, commit if the index differs from HEAD, then push.
    pub fn publish(
        &self,
        artifacts: &[Artifact],
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome, PublishError> {
        let mut staged = 0;
        for artifact in artifacts {
            if self.stage(artifact)? {
                staged += 1;
            }
        }
        tracing::debug!(staged, "artifacts staged");

        if !self.has_staged_changes()? {
            tracing::info!("no changes to commit");
            return Ok(PublishOutcome::NoChanges);
        }

        let message = commit_message(&self.settings.commit_prefix, now);
        self.git(&[OsStr::new("commit"), OsStr::new("-m"), OsStr::new(&message)])?;
        tracing::info!(%message, "committed artifacts");

        let pushed = if self.settings.push {
            self.rebase_onto_upstream()?;
            self.git(&[OsStr::new("push")])?;
            tracing::info!("pushed to remote");
            true
        } else {
            tracing::info!("push disabled, leaving commit local");
            false
        };

        Ok(PublishOutcome::Committed { message, pushed })
    }

    /// `git pull --rebase`, aborting a failed rebase so the branch and the
    /// local commit are left as they were before the pull.
    fn rebase_onto_upstream(&self) -> Result<(), PublishError> {
        let err = match self.git(&[OsStr::new("pull"), OsStr::new("--rebase")]) {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        if self.rebase_in_progress() {
            match self.git(&[OsStr::new("rebase"), OsStr::new("--abort")]) {
                Ok(_) => tracing::warn!(
                    error = %err,
                    "rebase onto upstream failed; aborted, local commit kept"
                ),
                Err(abort) => tracing::error!(error = %abort, "failed to abort rebase"),
            }
        }
        Err(err)
    }

    fn rebase_in_progress(&self) -> bool {
        let git_dir = match self.git(&[OsStr::new("rev-parse"), OsStr::new("--git-dir")]) {
            Ok(out) => PathBuf::from(String::from_utf8_lossy(&out.stdout).trim()),
            Err(_) => return false,
        };
        let git_dir = self.repo.join(git_dir);
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    /// `git add` one artifact. Returns false when there was nothing on disk to add.
    fn stage(&self, artifact: &Artifact) -> Result<bool, PublishError> {
        match artifact {
            Artifact::File(path) => {
                if !self.repo.join(path).is_file() {
                    tracing::info!(path = %path.display(), "not found, skipping stage");
                    return Ok(false);
                }
                self.git(&[OsStr::new("add"), OsStr::new("--"), path.as_os_str()])?;
                Ok(true)
            }
            Artifact::PngDir(dir) => {
                if !has_png(&self.repo.join(dir)) {
                    tracing::info!(dir = %dir.display(), "no plot images found, skipping stage");
                    return Ok(false);
                }
                let pathspec = dir.join("*.png");
                self.git(&[OsStr::new("add"), OsStr::new("--"), pathspec.as_os_str()])?;
                Ok(true)
            }
        }
    }

    fn has_staged_changes(&self) -> Result<bool, PublishError> {
        let output = self.run(&[
            OsStr::new("diff"),
            OsStr::new("--cached"),
            OsStr::new("--quiet"),
        ])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            code => Err(PublishError::Git {
                command: "diff --cached --quiet".into(),
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn git(&self, args: &[&OsStr]) -> Result<Output, PublishError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(PublishError::Git {
                command: describe(args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn run(&self, args: &[&OsStr]) -> Result<Output, PublishError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .output()
            .map_err(|source| PublishError::Spawn {
                command: describe(args),
                source,
            })
    }
}

fn describe(args: &[&OsStr]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_png(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|entries| {
            entries.flatten().any(|e| {
                e.path().is_file()
                    && e.path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
            })
        })
        .unwrap_or(false)
}
