// ABOUTME: Drives one deployment attempt and records its outcome.
// ABOUTME: Owns finalize semantics: hash advancement, prune, notification.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::compose::ComposeOps;
use crate::git::GitOps;
use crate::notify::{self, Notifier, NotifyEvent};
use crate::secrets::SecretsOps;
use crate::store::{DeploymentStatus, DeploymentStore, Registry, Repository, NO_CHANGE_MARKER};
use crate::types::{CommitHash, DeploymentId};

use super::attempt::{Attempt, ChangeCheck};
use super::error::DeployError;

/// The capability adapters a deployment needs.
#[derive(Clone)]
pub struct Adapters {
    pub git: Arc<dyn GitOps>,
    pub secrets: Arc<dyn SecretsOps>,
    pub compose: Arc<dyn ComposeOps>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Timeout for each subprocess-driving step.
    pub step_timeout: Duration,
    /// Timeout for the whole notification dispatch.
    pub notify_timeout: Duration,
    /// Prune unused images after a successful deployment.
    pub prune_images: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(600),
            notify_timeout: Duration::from_secs(30),
            prune_images: false,
        }
    }
}

/// Executes deployment attempts for the queue's workers.
pub struct Runner {
    adapters: Adapters,
    options: RunnerOptions,
    store: Arc<DeploymentStore>,
    registry: Arc<Registry>,
}

enum StepsOutcome {
    NoChange(CommitHash),
    Deployed(CommitHash),
}

impl Runner {
    pub fn new(
        adapters: Adapters,
        options: RunnerOptions,
        store: Arc<DeploymentStore>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            adapters,
            options,
            store,
            registry,
        }
    }

    pub fn store(&self) -> &Arc<DeploymentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Execute one deployment for `repo` and return the record id.
    ///
    /// Never returns an error: every failure is captured in the record. The
    /// caller (a queue worker) holds the project lock for the duration.
    pub async fn execute(&self, repo: Arc<Repository>) -> DeploymentId {
        let id = self.store.create(&repo.name);
        self.store.mark_running(id);

        tracing::info!(repo = %repo.name, deployment = %id, "deployment started");

        match self.run_steps(id, repo.clone()).await {
            Ok(StepsOutcome::NoChange(current)) => {
                self.store.set_commit(id, current);
                self.store.append_log(id, NO_CHANGE_MARKER);
                self.store.finish(id, DeploymentStatus::Success);
                tracing::info!(repo = %repo.name, deployment = %id, "no changes");
                // Nothing happened: no notification is fired, distinguishing
                // this from a deploy that succeeded.
            }
            Ok(StepsOutcome::Deployed(deployed)) => {
                if self.options.prune_images {
                    self.prune(id).await;
                }
                self.store.set_commit(id, deployed.clone());
                self.registry.advance_hash(&repo.name, deployed);
                self.store.finish(id, DeploymentStatus::Success);
                tracing::info!(repo = %repo.name, deployment = %id, "deployment succeeded");
                self.notify(id, &repo, NotifyEvent::Success).await;
            }
            Err(e) => {
                self.store
                    .append_log(id, format!("{} step failed: {e}", e.step()));
                self.store.finish(id, DeploymentStatus::Failed);
                // last_commit_hash stays untouched so the next poll cycle
                // retries the same commit.
                tracing::warn!(
                    repo = %repo.name,
                    deployment = %id,
                    step = %e.step(),
                    error = %e,
                    "deployment failed"
                );
                self.notify(id, &repo, NotifyEvent::Failure).await;
            }
        }

        id
    }

    async fn run_steps(
        &self,
        id: DeploymentId,
        repo: Arc<Repository>,
    ) -> Result<StepsOutcome, DeployError> {
        let last = self.registry.last_commit_hash(&repo.name);
        let attempt = Attempt::new(repo.clone(), last, self.options.step_timeout);

        let attempt = match attempt.check_remote(self.adapters.git.as_ref()).await? {
            ChangeCheck::NoChange(current) => return Ok(StepsOutcome::NoChange(current)),
            ChangeCheck::Changed(attempt) => attempt,
        };

        self.store.set_commit(id, attempt.target().clone());
        self.store
            .append_log(id, format!("target commit {}", attempt.target().short()));

        let attempt = attempt.sync_source(self.adapters.git.as_ref()).await?;
        self.store.append_log(
            id,
            format!("working copy at {}", repo.local_path.display()),
        );

        if let Some(env_file) = &repo.env_file {
            self.store
                .append_log(id, format!("decrypting {}", env_file.display()));
        }
        let attempt = attempt
            .prepare_secrets(self.adapters.secrets.as_ref())
            .await?;

        // Compose output is streamed into the record while the subprocess
        // runs; readers of a running deployment see the log grow.
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let store = Arc::clone(&self.store);
        let forwarder = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                store.append_log(id, line);
            }
        });

        let reconciled = attempt.reconcile(self.adapters.compose.as_ref(), tx).await;
        // The sender is gone either way; drain the forwarder so the log is
        // complete before the record turns terminal.
        if let Err(e) = forwarder.await {
            tracing::error!(deployment = %id, error = %e, "log forwarder task failed");
        }

        let attempt = reconciled?;
        self.store.append_log(
            id,
            format!("compose project converged at {}", attempt.deployed().short()),
        );

        Ok(StepsOutcome::Deployed(attempt.finish()))
    }

    /// Best-effort image prune. Failures are logged and never demote the
    /// deployment.
    async fn prune(&self, id: DeploymentId) {
        match self.adapters.compose.prune_images().await {
            Ok(reclaimed) => {
                self.store
                    .append_log(id, format!("pruned unused images, reclaimed {reclaimed} bytes"));
            }
            Err(e) => {
                self.store.append_log(id, format!("image prune failed: {e}"));
                tracing::warn!(deployment = %id, error = %e, "image prune failed");
            }
        }
    }

    async fn notify(&self, id: DeploymentId, repo: &Repository, event: NotifyEvent) {
        let Some(record) = self.store.get(id) else {
            return;
        };
        let urls = match event {
            NotifyEvent::Success => repo.notifications.for_success(),
            NotifyEvent::Failure => repo.notifications.for_failure(),
        };
        notify::fire_and_forget(
            self.adapters.notifier.as_ref(),
            &urls,
            event,
            &record,
            self.options.notify_timeout,
        )
        .await;
    }
}
