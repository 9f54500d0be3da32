// ABOUTME: Ephemeral deployment requests queued for admission.
// ABOUTME: Exist only inside the queue; a request is not a record.

use crate::types::RepoName;
use chrono::{DateTime, Utc};

/// Why a deployment was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// A poll tick noticed the repository was due for a check.
    Poll,
    /// An operator asked for it explicitly.
    Manual,
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Poll => write!(f, "poll"),
            TriggerReason::Manual => write!(f, "manual"),
        }
    }
}

/// One queued intent to deploy a repository.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub repo: RepoName,
    pub reason: TriggerReason,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic sequence used for FIFO ordering among equal priorities.
    /// A superseding request keeps the superseded one's sequence.
    pub(crate) seq: u64,
}

impl DeployRequest {
    /// Admission order among *ready* candidates: highest priority first,
    /// FIFO on ties. Readiness itself (project lock, dependency) is
    /// decided elsewhere and takes precedence over this ordering.
    pub(crate) fn beats(&self, other: &DeployRequest) -> bool {
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.seq < other.seq,
        }
    }
}
