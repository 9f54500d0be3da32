// ABOUTME: Attempt state marker types for the type state pattern.
// ABOUTME: State types carry the data proven to exist in that state.

use crate::types::CommitHash;

/// Initial state: record created, nothing checked yet.
/// Available actions: `check_remote()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Started;

/// Change check passed: the remote moved past the deployed commit.
/// Available actions: `sync_source()`
#[derive(Debug, Clone)]
pub struct Checked {
    pub(crate) target: CommitHash,
}

/// Working copy matches the remote tip.
/// Available actions: `prepare_secrets()`
#[derive(Debug, Clone)]
pub struct Synced {
    pub(crate) deployed: CommitHash,
}

/// Secrets decrypted (or none declared); containers may start.
/// Available actions: `reconcile()`
#[derive(Debug, Clone)]
pub struct SecretsReady {
    pub(crate) deployed: CommitHash,
}

/// Compose project converged. Terminal; `finish()` yields the commit.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub(crate) deployed: CommitHash,
}
