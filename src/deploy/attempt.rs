// ABOUTME: State transition methods for one deployment attempt.
// ABOUTME: Each method consumes self and returns the next state on success.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::compose::ComposeOps;
use crate::git::GitOps;
use crate::secrets::{SecretsError, SecretsOps};
use crate::store::Repository;
use crate::types::CommitHash;

use super::error::{DeployError, Step};
use super::state::{Checked, Reconciled, SecretsReady, Started, Synced};

/// Name of the decrypted env file placed next to the compose file.
const DECRYPTED_ENV_FILE: &str = ".env";

/// One in-flight deployment attempt, parameterized by its current state.
///
/// The state type `S` carries state-specific data (like the target commit)
/// so that later steps can rely on it existing at compile time.
#[derive(Debug)]
pub struct Attempt<S> {
    pub(crate) repo: Arc<Repository>,
    pub(crate) last_hash: Option<CommitHash>,
    pub(crate) step_timeout: Duration,
    pub(crate) state: S,
}

/// Outcome of the change check: either nothing to do, or a target to chase.
pub enum ChangeCheck {
    /// Remote tip equals the deployed commit. The attempt ends as a no-op
    /// success; no pull, secrets, or container step runs.
    NoChange(CommitHash),
    /// The remote moved; continue with the returned attempt.
    Changed(Attempt<Checked>),
}

impl Attempt<Started> {
    pub fn new(repo: Arc<Repository>, last_hash: Option<CommitHash>, step_timeout: Duration) -> Self {
        Attempt {
            repo,
            last_hash,
            step_timeout,
            state: Started,
        }
    }

    /// Compare the remote tip against the last deployed commit.
    ///
    /// A repository that has never deployed successfully always counts as
    /// changed. The decision made here is authoritative; the poller never
    /// pre-judges it.
    #[must_use = "attempt state must be used"]
    pub async fn check_remote<G: GitOps + ?Sized>(
        self,
        git: &G,
    ) -> Result<ChangeCheck, DeployError> {
        let remote = tokio::time::timeout(
            self.step_timeout,
            git.remote_hash(&self.repo.git_url, &self.repo.branch, self.repo.token.as_deref()),
        )
        .await
        .map_err(|_| DeployError::StepTimeout {
            step: Step::Check,
            timeout: self.step_timeout,
        })?
        .map_err(|e| DeployError::git(Step::Check, e))?;

        match &self.last_hash {
            Some(last) if *last == remote => Ok(ChangeCheck::NoChange(remote)),
            _ => Ok(ChangeCheck::Changed(Attempt {
                repo: self.repo,
                last_hash: self.last_hash,
                step_timeout: self.step_timeout,
                state: Checked { target: remote },
            })),
        }
    }
}

impl Attempt<Checked> {
    /// The commit this attempt is chasing.
    pub fn target(&self) -> &CommitHash {
        &self.state.target
    }

    /// Bring the working copy to the remote tip: clone when the path is
    /// missing or empty, fetch + hard reset otherwise.
    #[must_use = "attempt state must be used"]
    pub async fn sync_source<G: GitOps + ?Sized>(
        self,
        git: &G,
    ) -> Result<Attempt<Synced>, DeployError> {
        let repo = &self.repo;
        let needs_clone = match std::fs::read_dir(&repo.local_path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                return Err(DeployError::Workdir {
                    step: Step::Pull,
                    source: e,
                });
            }
        };

        let sync = async {
            if needs_clone {
                git.clone_repo(
                    &repo.git_url,
                    &repo.branch,
                    &repo.local_path,
                    repo.token.as_deref(),
                )
                .await
            } else {
                git.pull(
                    &repo.local_path,
                    &repo.git_url,
                    &repo.branch,
                    repo.token.as_deref(),
                )
                .await
            }
        };

        let deployed = tokio::time::timeout(self.step_timeout, sync)
            .await
            .map_err(|_| DeployError::StepTimeout {
                step: Step::Pull,
                timeout: self.step_timeout,
            })?
            .map_err(|e| DeployError::git(Step::Pull, e))?;

        Ok(Attempt {
            repo: self.repo,
            last_hash: self.last_hash,
            step_timeout: self.step_timeout,
            state: Synced { deployed },
        })
    }
}

impl Attempt<Synced> {
    /// Decrypt the declared env file into the compose directory.
    ///
    /// Runs strictly before any container step so a stack is never brought
    /// up against a stale or missing secrets file. A repository without an
    /// `env_file` passes through untouched.
    #[must_use = "attempt state must be used"]
    pub async fn prepare_secrets<S: SecretsOps + ?Sized>(
        self,
        secrets: &S,
    ) -> Result<Attempt<SecretsReady>, DeployError> {
        if let Some(env_file) = &self.repo.env_file {
            let compose_dir = self.repo.compose_dir();
            let encrypted = compose_dir.join(env_file);
            let dest = compose_dir.join(DECRYPTED_ENV_FILE);

            let work = async {
                if !secrets.is_encrypted(&encrypted).await? {
                    return Err(SecretsError::Malformed(format!(
                        "{} is not a SOPS-encrypted file",
                        encrypted.display()
                    )));
                }
                secrets.decrypt(&encrypted, &dest).await
            };

            tokio::time::timeout(self.step_timeout, work)
                .await
                .map_err(|_| DeployError::StepTimeout {
                    step: Step::Decrypt,
                    timeout: self.step_timeout,
                })??;
        }

        Ok(Attempt {
            state: SecretsReady {
                deployed: self.state.deployed,
            },
            repo: self.repo,
            last_hash: self.last_hash,
            step_timeout: self.step_timeout,
        })
    }
}

impl Attempt<SecretsReady> {
    /// Bring the compose project up, streaming combined output through
    /// `output` as it is produced. The adapter enforces the timeout and
    /// kills the subprocess on expiry.
    #[must_use = "attempt state must be used"]
    pub async fn reconcile<C: ComposeOps + ?Sized>(
        self,
        compose: &C,
        output: mpsc::Sender<String>,
    ) -> Result<Attempt<Reconciled>, DeployError> {
        compose
            .bring_up(
                &self.repo.compose_dir(),
                self.repo.name.as_str(),
                self.step_timeout,
                output,
            )
            .await?;

        Ok(Attempt {
            state: Reconciled {
                deployed: self.state.deployed,
            },
            repo: self.repo,
            last_hash: self.last_hash,
            step_timeout: self.step_timeout,
        })
    }
}

impl Attempt<Reconciled> {
    /// The commit now running.
    pub fn deployed(&self) -> &CommitHash {
        &self.state.deployed
    }

    /// Consume the attempt, yielding the deployed commit for finalize.
    pub fn finish(self) -> CommitHash {
        self.state.deployed
    }
}
