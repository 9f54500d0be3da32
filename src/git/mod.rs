// ABOUTME: Git capability interface for the deployment core.
// ABOUTME: Clone, remote/local hash reads, and conflict-proof pull.

mod cli;
mod error;

pub use cli::GitCli;
pub use error::{GitError, GitErrorKind};

use crate::types::CommitHash;
use async_trait::async_trait;
use std::path::Path;

/// Git operations the deployment core depends on.
///
/// Implementations must be safe to call concurrently for different working
/// directories; the scheduler guarantees a given directory is only touched
/// by one deployment at a time.
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Clone `url` at `branch` into `dest` and return the checked-out hash.
    async fn clone_repo(
        &self,
        url: &str,
        branch: &str,
        dest: &Path,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError>;

    /// Tip hash of `branch` on the remote, without touching any checkout.
    async fn remote_hash(
        &self,
        url: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError>;

    /// Hash of HEAD in the local working copy at `dest`.
    async fn local_hash(&self, dest: &Path) -> Result<CommitHash, GitError>;

    /// Bring `dest` to the remote tip of `branch` and return the new hash.
    ///
    /// This is fetch + hard reset, not a merge: local divergence (including
    /// force-pushed history) never produces a conflict.
    async fn pull(
        &self,
        dest: &Path,
        url: &str,
        branch: &str,
        token: Option<&str>,
    ) -> Result<CommitHash, GitError>;
}
