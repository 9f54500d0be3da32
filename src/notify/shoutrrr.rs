// ABOUTME: Shoutrrr-based notification adapter.
// ABOUTME: Shells out to the shoutrrr CLI, one send per target URL.

use super::{Notifier, NotifyError, NotifyEvent};
use crate::store::DeploymentRecord;
use async_trait::async_trait;
use tokio::process::Command;

/// Notification adapter backed by the `shoutrrr` CLI.
#[derive(Debug, Default)]
pub struct Shoutrrr;

impl Shoutrrr {
    pub fn new() -> Self {
        Self
    }

    fn format_message(event: NotifyEvent, deployment: &DeploymentRecord) -> String {
        let duration = match (deployment.started_at, deployment.finished_at) {
            (started, Some(finished)) => (finished - started).num_seconds(),
            _ => 0,
        };
        let commit = deployment
            .commit_hash
            .as_ref()
            .map(|h| h.short().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "caravel {}: repo={} commit={} duration={}s deployment={}",
            event.as_str().to_uppercase(),
            deployment.repo,
            commit,
            duration,
            deployment.id,
        )
    }
}

#[async_trait]
impl Notifier for Shoutrrr {
    async fn notify(
        &self,
        urls: &[String],
        event: NotifyEvent,
        deployment: &DeploymentRecord,
    ) -> Result<(), NotifyError> {
        let message = Self::format_message(event, deployment);
        let mut first_failure: Option<NotifyError> = None;

        for url in urls {
            let result = Command::new("shoutrrr")
                .args(["send", "-u", url, "-m", &message])
                .kill_on_drop(true)
                .output()
                .await;

            match result {
                Ok(output) if output.status.success() => {
                    tracing::debug!(url = %url, "notification sent");
                }
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    tracing::warn!(url = %url, stderr = %stderr, "shoutrrr send failed");
                    first_failure.get_or_insert(NotifyError::SendFailed(stderr));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "shoutrrr executable not available");
                    first_failure.get_or_insert(NotifyError::SenderUnavailable(e.to_string()));
                }
            }
        }

        match first_failure {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}
