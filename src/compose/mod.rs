// ABOUTME: Container capability interface for compose stacks.
// ABOUTME: Bring-up with streamed output, image prune, and log tailing.

mod docker;

pub use docker::DockerCompose;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from compose bring-up and log operations.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("compose exited with status {code}")]
    NonZeroExit { code: i32 },

    #[error("compose did not finish within {}s", timeout.as_secs())]
    Timeout { timeout: Duration },

    #[error("no compose file found in {0}")]
    NoComposeFile(String),

    #[error("failed to run compose: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("container runtime error: {0}")]
    Runtime(String),
}

/// Image prune failures. Never fatal for a deployment.
#[derive(Debug, Error)]
#[error("image prune failed: {0}")]
pub struct PruneError(pub String);

/// Container operations the deployment core depends on.
#[async_trait]
pub trait ComposeOps: Send + Sync {
    /// Bring the compose project rooted at `dir` up, detached.
    ///
    /// Combined stdout/stderr is sent line by line through `output` as it is
    /// produced, never buffered whole. On timeout the compose process is
    /// killed and `ComposeError::Timeout` returned.
    async fn bring_up(
        &self,
        dir: &Path,
        project: &str,
        timeout: Duration,
        output: mpsc::Sender<String>,
    ) -> Result<(), ComposeError>;

    /// Remove unused images. Returns the number of bytes reclaimed.
    async fn prune_images(&self) -> Result<u64, PruneError>;

    /// Last `lines` lines of a container's combined output. Used by the
    /// inspection surface, not by the deploy path.
    async fn tail_logs(&self, container: &str, lines: u64) -> Result<String, ComposeError>;
}
