// ABOUTME: In-memory adapter doubles for integration tests.
// ABOUTME: Controllable git remotes, compose outcomes, and notifications.

use async_trait::async_trait;
use caravel::compose::{ComposeError, ComposeOps, PruneError};
use caravel::git::{GitError, GitOps};
use caravel::notify::{Notifier, NotifyError, NotifyEvent};
use caravel::secrets::{SecretsError, SecretsOps};
use caravel::store::DeploymentRecord;
use caravel::types::CommitHash;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Git double serving remote hashes from a controllable map keyed by URL.
/// Clone and pull never touch the filesystem.
#[derive(Default)]
pub struct FakeGit {
    remotes: Mutex<HashMap<String, CommitHash>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remote(&self, url: &str, hash: &str) {
        self.remotes
            .lock()
            .insert(url.to_string(), CommitHash::new(hash).unwrap());
    }

    fn current(&self, url: &str) -> CommitHash {
        self.remotes
            .lock()
            .get(url)
            .cloned()
            .expect("remote hash configured for url")
    }
}

#[async_trait]
impl GitOps for FakeGit {
    async fn clone_repo(
        &self,
        url: &str,
        _branch: &str,
        _dest: &Path,
        _token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        self.calls.lock().push(format!("clone {url}"));
        Ok(self.current(url))
    }

    async fn remote_hash(
        &self,
        url: &str,
        _branch: &str,
        _token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        self.calls.lock().push(format!("remote_hash {url}"));
        Ok(self.current(url))
    }

    async fn local_hash(&self, _dest: &Path) -> Result<CommitHash, GitError> {
        Ok(CommitHash::new("0000000").unwrap())
    }

    async fn pull(
        &self,
        _dest: &Path,
        url: &str,
        _branch: &str,
        _token: Option<&str>,
    ) -> Result<CommitHash, GitError> {
        self.calls.lock().push(format!("pull {url}"));
        Ok(self.current(url))
    }
}

/// Secrets double with a failure toggle.
#[derive(Default)]
pub struct FakeSecrets {
    fail: Mutex<bool>,
    pub decrypts: Mutex<Vec<String>>,
}

impl FakeSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, fail: bool) {
        *self.fail.lock() = fail;
    }
}

#[async_trait]
impl SecretsOps for FakeSecrets {
    async fn is_encrypted(&self, _path: &Path) -> Result<bool, SecretsError> {
        Ok(true)
    }

    async fn decrypt(&self, path: &Path, _dest: &Path) -> Result<(), SecretsError> {
        if *self.fail.lock() {
            return Err(SecretsError::MissingKey(path.display().to_string()));
        }
        self.decrypts.lock().push(path.display().to_string());
        Ok(())
    }
}

/// One recorded compose bring-up with its wall-clock interval.
#[derive(Debug, Clone)]
pub struct BringUp {
    pub project: String,
    pub started: Instant,
    pub finished: Instant,
}

impl BringUp {
    pub fn overlaps(&self, other: &BringUp) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Compose double that records bring-up intervals and can fail per project.
pub struct FakeCompose {
    delay: Duration,
    failing: Mutex<HashSet<String>>,
    /// Projects in bring-up entry order, pushed before any delay.
    pub started: Mutex<Vec<String>>,
    pub runs: Mutex<Vec<BringUp>>,
}

impl FakeCompose {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Simulate compose taking `delay` to converge.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            failing: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_project(&self, project: &str) {
        self.failing.lock().insert(project.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    pub fn runs_for(&self, project: &str) -> Vec<BringUp> {
        self.runs
            .lock()
            .iter()
            .filter(|r| r.project == project)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ComposeOps for FakeCompose {
    async fn bring_up(
        &self,
        _dir: &Path,
        project: &str,
        _timeout: Duration,
        output: mpsc::Sender<String>,
    ) -> Result<(), ComposeError> {
        let started = Instant::now();
        self.started.lock().push(project.to_string());
        let _ = output.send(format!("starting compose project {project}")).await;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failed = self.failing.lock().contains(project);
        self.runs.lock().push(BringUp {
            project: project.to_string(),
            started,
            finished: Instant::now(),
        });

        if failed {
            Err(ComposeError::NonZeroExit { code: 1 })
        } else {
            Ok(())
        }
    }

    async fn prune_images(&self) -> Result<u64, PruneError> {
        Ok(0)
    }

    async fn tail_logs(&self, _container: &str, _lines: u64) -> Result<String, ComposeError> {
        Ok(String::new())
    }
}

/// Notifier double recording every dispatched event.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(NotifyEvent, String, Vec<String>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, repo: &str) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(_, r, _)| r == repo)
            .map(|(e, _, _)| *e)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        urls: &[String],
        event: NotifyEvent,
        deployment: &DeploymentRecord,
    ) -> Result<(), NotifyError> {
        self.events
            .lock()
            .push((event, deployment.repo.to_string(), urls.to_vec()));
        Ok(())
    }
}
