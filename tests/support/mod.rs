// ABOUTME: Test support utilities.
// ABOUTME: Builds an orchestrator harness wired to in-memory adapter doubles.

use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use caravel::config::Config;
use caravel::deploy::{Adapters, Runner, RunnerOptions};
use caravel::queue::DeployQueue;
use caravel::store::{DeploymentRecord, DeploymentStore, Registry};
use caravel::types::{CommitHash, DeploymentId, RepoName};

// Each test binary only uses some of these items, so allow dead_code.
#[allow(dead_code)]
pub mod fakes;

use fakes::{FakeCompose, FakeGit, FakeSecrets, RecordingNotifier};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("caravel=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A full orchestrator wired to doubles, with handles to each double.
#[allow(dead_code)]
pub struct Harness {
    pub queue: Arc<DeployQueue>,
    pub git: Arc<FakeGit>,
    pub secrets: Arc<FakeSecrets>,
    pub compose: Arc<FakeCompose>,
    pub notifier: Arc<RecordingNotifier>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(yaml: &str) -> Self {
        Self::with_compose(yaml, Arc::new(FakeCompose::new()))
    }

    pub fn with_compose(yaml: &str, compose: Arc<FakeCompose>) -> Self {
        init_tracing();

        let config: Config = serde_yaml::from_str(yaml).expect("valid test config");
        config.validate().expect("valid test config");

        let store = Arc::new(DeploymentStore::in_memory());
        let registry = Arc::new(Registry::from_config(&config, &store));

        let git = Arc::new(FakeGit::new());
        let secrets = Arc::new(FakeSecrets::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let adapters = Adapters {
            git: Arc::clone(&git) as _,
            secrets: Arc::clone(&secrets) as _,
            compose: Arc::clone(&compose) as _,
            notifier: Arc::clone(&notifier) as _,
        };
        let options = RunnerOptions {
            step_timeout: Duration::from_secs(5),
            notify_timeout: Duration::from_secs(5),
            prune_images: false,
        };

        let runner = Arc::new(Runner::new(adapters, options, store, registry));
        let queue = Arc::new(DeployQueue::new(runner));

        Self {
            queue,
            git,
            secrets,
            compose,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<DeploymentStore> {
        self.queue.runner().store()
    }

    pub fn repo(&self, name: &str) -> RepoName {
        RepoName::new(name).expect("valid repo name")
    }

    pub fn last_hash(&self, name: &str) -> Option<CommitHash> {
        self.queue
            .runner()
            .registry()
            .last_commit_hash(&self.repo(name))
    }

    /// Latest record id for a repo, used as a baseline before triggering.
    pub fn baseline(&self, name: &str) -> Option<DeploymentId> {
        self.store().latest_for(&self.repo(name)).map(|r| r.id)
    }

    /// Wait until a record newer than `baseline` reaches a terminal state.
    /// Panics after five seconds.
    pub async fn wait_terminal(
        &self,
        name: &str,
        baseline: Option<DeploymentId>,
    ) -> DeploymentRecord {
        let repo = self.repo(name);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(record) = self.store().latest_for(&repo) {
                let is_new = baseline.is_none_or(|prior| record.id > prior);
                if is_new && record.status.is_terminal() {
                    return record;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "deployment of '{name}' never reached a terminal state"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until the queue has no pending requests, then drain in-flight
    /// work by stopping it.
    pub async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.queue.pending_len() > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "queue never emptied"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.queue.stop().await;
    }
}
