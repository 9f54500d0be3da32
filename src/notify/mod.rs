// ABOUTME: Notification trigger for deployment outcomes.
// ABOUTME: Best-effort dispatch that never fails a deployment.

mod shoutrrr;

pub use shoutrrr::Shoutrrr;

use crate::store::DeploymentRecord;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Outcome event carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Success,
    Failure,
}

impl NotifyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyEvent::Success => "success",
            NotifyEvent::Failure => "failure",
        }
    }
}

/// Errors from a single notification dispatch. Logged, never propagated
/// into the deployment outcome.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification sender unavailable: {0}")]
    SenderUnavailable(String),

    #[error("notification send failed: {0}")]
    SendFailed(String),
}

/// Outbound notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `event` for `deployment` to every URL in `urls`.
    ///
    /// Implementations report the first hard failure but must attempt all
    /// URLs; the caller only logs the error.
    async fn notify(
        &self,
        urls: &[String],
        event: NotifyEvent,
        deployment: &DeploymentRecord,
    ) -> Result<(), NotifyError>;
}

/// Dispatch a notification with a bounded timeout, swallowing all failures.
///
/// This is the only entry point the deploy path uses; the trait itself is
/// kept fallible so adapters stay testable.
pub async fn fire_and_forget(
    notifier: &dyn Notifier,
    urls: &[String],
    event: NotifyEvent,
    deployment: &DeploymentRecord,
    timeout: Duration,
) {
    if urls.is_empty() {
        tracing::debug!(
            deployment = %deployment.id,
            event = event.as_str(),
            "no notification targets configured"
        );
        return;
    }

    match tokio::time::timeout(timeout, notifier.notify(urls, event, deployment)).await {
        Ok(Ok(())) => {
            tracing::info!(
                deployment = %deployment.id,
                event = event.as_str(),
                urls = urls.len(),
                "notifications sent"
            );
        }
        Ok(Err(e)) => {
            tracing::warn!(
                deployment = %deployment.id,
                event = event.as_str(),
                error = %e,
                "notification failed"
            );
        }
        Err(_) => {
            tracing::warn!(
                deployment = %deployment.id,
                event = event.as_str(),
                timeout_secs = timeout.as_secs(),
                "notification timed out"
            );
        }
    }
}
