// ABOUTME: Per-repository poll timers that feed the deployment queue.
// ABOUTME: Timers only enqueue; change detection happens inside the attempt.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::{DeployQueue, QueueError, TriggerReason};
use crate::store::Repository;

/// One poll timer per repository, each on its own interval.
///
/// A tick enqueues a request and nothing more: the queue collapses
/// duplicates, and the deployment's own change check decides whether any
/// work happens. A slow deployment therefore never delays other timers.
pub struct Poller {
    queue: Arc<DeployQueue>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Poller {
    /// Spawn a timer task for every repository in the registry.
    pub fn start(queue: Arc<DeployQueue>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let repos = queue.runner().registry().all();

        let tasks = repos
            .into_iter()
            .map(|repo| {
                let queue = Arc::clone(&queue);
                let rx = shutdown.subscribe();
                tokio::spawn(poll_repo(queue, repo, rx))
            })
            .collect();

        Self {
            queue,
            shutdown,
            tasks,
        }
    }

    pub fn queue(&self) -> &Arc<DeployQueue> {
        &self.queue
    }

    /// Stop all timers and wait for them to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "poll timer task failed");
            }
        }
    }
}

async fn poll_repo(queue: Arc<DeployQueue>, repo: Arc<Repository>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(repo.poll_interval);
    // First tick fires immediately; that is the startup deployment check.
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::debug!(
        repo = %repo.name,
        interval_secs = repo.poll_interval.as_secs(),
        "poll timer started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match queue.enqueue(&repo.name, TriggerReason::Poll, repo.priority) {
                    Ok(outcome) => {
                        tracing::trace!(repo = %repo.name, ?outcome, "poll tick queued");
                    }
                    Err(QueueError::Stopped) => {
                        tracing::debug!(repo = %repo.name, "queue stopped, poll timer exiting");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(repo = %repo.name, error = %e, "poll enqueue failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                tracing::debug!(repo = %repo.name, "poll timer stopped");
                return;
            }
        }
    }
}
