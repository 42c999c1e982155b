//! Best-effort replication of the persisted portfolio to a remote
//! git store.
//!
//! Replication runs off the critical path: the monitor spawns it after
//! each successful durable write and never awaits the result. The
//! durable local file stays the source of truth, so any failure here
//! is logged and dropped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::debug;

use oi_monitor_core::traits::ReplicationSink;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sink used when replication is disabled and in tests.
pub struct NoopReplicationSink;

#[async_trait]
impl ReplicationSink for NoopReplicationSink {
    async fn replicate(&self, _state: &str) -> Result<()> {
        Ok(())
    }
}

/// Commits and pushes the portfolio file to a git remote.
pub struct GitReplicationSink {
    file: PathBuf,
    remote: String,
    branch: String,
}

impl GitReplicationSink {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    fn repo_dir(&self) -> &Path {
        self.file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
    }

    fn file_name(&self) -> String {
        self.file
            .file_name()
            .map_or_else(|| self.file.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn commit_message() -> String {
        format!("Update portfolio: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }

    async fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = tokio::time::timeout(
            GIT_TIMEOUT,
            Command::new("git")
                .args(args)
                .current_dir(self.repo_dir())
                .env("GIT_TERMINAL_PROMPT", "0")
                .output(),
        )
        .await
        .with_context(|| format!("git {} timed out", args.join(" ")))?
        .with_context(|| format!("failed to spawn git {}", args.join(" ")))?;
        Ok(output)
    }
}

#[async_trait]
impl ReplicationSink for GitReplicationSink {
    /// Stages, commits, and pushes the already-written portfolio file.
    ///
    /// The serialized state argument is ignored: the durable write has
    /// placed the exact bytes on disk and those are what get mirrored.
    async fn replicate(&self, _state: &str) -> Result<()> {
        // Missing git binary or not a repository: mirror is simply
        // unavailable, which is not an error for a best-effort sink.
        let Ok(inside_repo) = self.git(&["rev-parse", "--git-dir"]).await else {
            debug!("git unavailable, skipping replication");
            return Ok(());
        };
        if !inside_repo.status.success() {
            debug!("Not inside a git repository, skipping replication");
            return Ok(());
        }

        let file = self.file_name();
        let add = self.git(&["add", &file]).await?;
        if !add.status.success() {
            bail!(
                "git add failed: {}",
                String::from_utf8_lossy(&add.stderr).trim()
            );
        }

        let diff = self.git(&["diff", "--cached", "--quiet", "--", &file]).await?;
        if diff.status.success() {
            debug!("Portfolio unchanged, skipping replication");
            return Ok(());
        }

        let message = Self::commit_message();
        let commit = self.git(&["commit", "-m", &message, "--", &file]).await?;
        if !commit.status.success() {
            bail!(
                "git commit failed: {}",
                String::from_utf8_lossy(&commit.stderr).trim()
            );
        }

        let push = self.git(&["push", &self.remote, &self.branch]).await?;
        if !push.status.success() {
            bail!(
                "git push failed: {}",
                String::from_utf8_lossy(&push.stderr).trim()
            );
        }

        debug!(remote = %self.remote, branch = %self.branch, "Portfolio replicated");
        Ok(())
    }
}
