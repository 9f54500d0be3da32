// ABOUTME: Git error types with SNAFU pattern.
// ABOUTME: Classifies stderr into auth/network/conflict/corrupted kinds.

use crate::types::CommitHashError;
use snafu::Snafu;

/// Unified git error for all adapter operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GitError {
    #[snafu(display("failed to run git: {source}"))]
    Spawn { source: std::io::Error },

    #[snafu(display("git {op} failed: {stderr}"))]
    Command { op: &'static str, stderr: String },

    #[snafu(display("git {op} produced no usable output"))]
    EmptyOutput { op: &'static str },

    #[snafu(display("invalid commit hash from git: {source}"))]
    BadHash { source: CommitHashError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    /// Credentials rejected or missing.
    Auth,
    /// Remote unreachable or transfer interrupted. Retriable by the next
    /// poll cycle.
    Network,
    /// Working tree state conflicts with the requested update.
    Conflict,
    /// Local repository or git installation is broken.
    Corrupted,
}

impl GitError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> GitErrorKind {
        match self {
            GitError::Spawn { .. } => GitErrorKind::Corrupted,
            GitError::EmptyOutput { .. } => GitErrorKind::Corrupted,
            GitError::BadHash { .. } => GitErrorKind::Corrupted,
            GitError::Command { stderr, .. } => classify_stderr(stderr),
        }
    }
}

fn classify_stderr(stderr: &str) -> GitErrorKind {
    let lower = stderr.to_lowercase();

    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("could not read password")
        || lower.contains("permission denied")
        || lower.contains("403")
        || lower.contains("401")
    {
        return GitErrorKind::Auth;
    }

    if lower.contains("not a git repository")
        || lower.contains("corrupt")
        || lower.contains("bad object")
        || lower.contains("unborn")
    {
        return GitErrorKind::Corrupted;
    }

    if lower.contains("would be overwritten")
        || lower.contains("conflict")
        || lower.contains("unmerged")
    {
        return GitErrorKind::Conflict;
    }

    // Unresolvable hosts, refused connections, stalled transfers: anything
    // transient lands here so the next poll retries it.
    GitErrorKind::Network
}
