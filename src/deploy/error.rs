// ABOUTME: Error types for deployment attempts.
// ABOUTME: Wraps adapter failures with the step that produced them.

use crate::compose::ComposeError;
use crate::git::{GitError, GitErrorKind};
use crate::secrets::SecretsError;
use std::time::Duration;

/// Pipeline step names, used in errors and deployment logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Check,
    Pull,
    Decrypt,
    Reconcile,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Step::Check => "check",
            Step::Pull => "pull",
            Step::Decrypt => "decrypt",
            Step::Reconcile => "reconcile",
        };
        write!(f, "{s}")
    }
}

/// Errors that terminate the current deployment attempt.
///
/// These never propagate past the runner: they become a Failed record with
/// the message appended to the deployment log.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Git operation failed during check or pull.
    #[error("git failure ({kind:?}) in {step} step: {message}")]
    Git {
        step: Step,
        kind: GitErrorKind,
        message: String,
    },

    /// Secrets decryption failed; containers were not touched.
    #[error("secrets failure: {source}")]
    Secrets { source: SecretsError },

    /// Compose bring-up failed or timed out.
    #[error("container failure: {source}")]
    Compose { source: ComposeError },

    /// A subprocess-driving step exceeded its timeout.
    #[error("{step} step timed out after {}s", timeout.as_secs())]
    StepTimeout { step: Step, timeout: Duration },

    /// Working directory could not be inspected or prepared.
    #[error("working directory error in {step} step: {source}")]
    Workdir {
        step: Step,
        source: std::io::Error,
    },
}

impl DeployError {
    pub(crate) fn git(step: Step, source: GitError) -> Self {
        DeployError::Git {
            step,
            kind: source.kind(),
            message: source.to_string(),
        }
    }

    /// The step this error aborted.
    pub fn step(&self) -> Step {
        match self {
            DeployError::Git { step, .. } => *step,
            DeployError::Secrets { .. } => Step::Decrypt,
            DeployError::Compose { .. } => Step::Reconcile,
            DeployError::StepTimeout { step, .. } => *step,
            DeployError::Workdir { step, .. } => *step,
        }
    }
}

impl From<SecretsError> for DeployError {
    fn from(source: SecretsError) -> Self {
        DeployError::Secrets { source }
    }
}

impl From<ComposeError> for DeployError {
    fn from(source: ComposeError) -> Self {
        DeployError::Compose { source }
    }
}
