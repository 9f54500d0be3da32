// ABOUTME: Production git adapter driving the git binary via subprocess.
// ABOUTME: Caches remote hashes briefly to absorb poll bursts.

use super::error::{GitError, SpawnSnafu};
use super::GitOps;
use crate::types::CommitHash;
use async_trait::async_trait;
use parking_lot::Mutex;
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How long a fetched remote hash stays valid. Long enough to mutualise
/// checks within a burst of deployments, short enough not to mask new
/// commits between poll cycles.
const REMOTE_HASH_TTL: Duration = Duration::from_secs(5);

/// Git adapter backed by the `git` CLI.
pub struct GitCli {
    remote_cache: Mutex<HashMap<(String, String), (Instant, CommitHash)>>,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            remote_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Embed the token into an http(s) URL for authenticated operations.
    fn auth_url(url: &str, token: Option<&str>) -> String {
        match (token, url.split_once("://")) {
            (Some(token), Some((scheme, rest)))
                if scheme == "http" || scheme == "https" =>
            {
                format!("{scheme}://{token}@{rest}")
            }
            _ => url.to_string(),
        }
    }

    /// Strip the token from command output before it lands in errors or logs.
    fn redact(text: &str, token: Option<&str>) -> String {
        match token {
            Some(token) if !token.is_empty() => text.replace(token, "***"),
            _ => text.to_string(),
        }
    }

    async fn run(
        op: &'static str,
        token: Option<&str>,
        args: &[&str],
    ) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context(SpawnSnafu)?;

        if !output.status.success() {
            let stderr = Self::redact(&String::from_utf8_lossy(&output.stderr), token);
            return Err(GitError::Command { op, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn head_hash(dest: &Path) -> Result<CommitHash, GitError> {
        let dest_str = dest.to_string_lossy();
        let out = Self::run("rev-parse", None, &["-C", &dest_str, "rev-parse", "HEAD"]).await?;
        parse_hash("rev-parse", out.trim())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_hash(op: &'static str, raw: &str) -> Result<CommitHash, GitError> {
    if raw.is_empty() {
        return Err(GitError::EmptyOutput { op });
    }
    CommitHash::new(raw).map_err(|source| GitError::BadHash { source })
}

#[async_trait]
impl GitOps for GitCli {
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.context(SpawnSnafu)?;
        }

        let auth = Self::auth_url(url, token);
        let dest_str = dest.to_string_lossy();
        Self::run(
            "clone",
            token,
            &[
                "clone",
                "--branch",
                branch,
                "--single-branch",
                &auth,
                &dest_str,
            ],
        )
        .await?;

        Self::head_hash(dest).await
    }

    async fn remote_hash(
        &self,
        url: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        let key = (url.to_string(), branch.to_string());

        if let Some((fetched_at, hash)) = self.remote_cache.lock().get(&key) {
            if fetched_at.elapsed() <= REMOTE_HASH_TTL {
                return Ok(hash.clone());
            }
        }

        let auth = Self::auth_url(url, token);
        let refspec = format!("refs/heads/{branch}");
        let out = Self::run("ls-remote", token, &["ls-remote", &auth, &refspec]).await?;

        let raw = out
            .split_whitespace()
            .next()
            .ok_or(GitError::EmptyOutput { op: "ls-remote" })?;
        let hash = parse_hash("ls-remote", raw)?;

        self.remote_cache
            .lock()
            .insert(key, (Instant::now(), hash.clone()));
        Ok(hash)
    }

    async fn local_hash(&self, dest: &Path) -> Result<CommitHash, GitError> {
        Self::head_hash(dest).await
    }

    async fn pull(
        &self,
        dest: &Path,
        url: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        let auth = Self::auth_url(url, token);
        let dest_str = dest.to_string_lossy();

        Self::run("fetch", token, &["-C", &dest_str, "fetch", &auth, branch]).await?;

        // Hard reset instead of merge so force-pushes and local drift never
        // conflict. The working copy is owned by caravel, nothing to keep.
        Self::run(
            "reset",
            token,
            &["-C", &dest_str, "reset", "--hard", "FETCH_HEAD"],
        )
        .await?;
        Self::run("clean", token, &["-C", &dest_str, "clean", "-fd"]).await?;

        Self::head_hash(dest).await
    }
}
