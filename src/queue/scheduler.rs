// ABOUTME: The deployment queue: admission, dispatch, and graceful stop.
// ABOUTME: One dispatcher task, bounded worker slots, per-project locks.

use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::deploy::Runner;
use crate::store::{DeploymentStatus, Repository};
use crate::types::{ProjectName, RepoName};

use super::request::{DeployRequest, TriggerReason};

/// How many deployments may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// One deployment at a time, global.
    Sequential,
    /// Up to `max` deployments at once, still never two per project.
    Parallel(usize),
}

impl ConcurrencyPolicy {
    fn worker_slots(self) -> usize {
        match self {
            ConcurrencyPolicy::Sequential => 1,
            ConcurrencyPolicy::Parallel(max) => max.max(1),
        }
    }
}

/// What happened to an accepted enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new request joined the queue.
    Accepted,
    /// A pending request for the same repository absorbed this one. The
    /// earlier request keeps its queue position; the higher of the two
    /// priorities wins.
    Superseded,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is stopped, not accepting deployments")]
    Stopped,

    #[error("unknown repository: {0}")]
    UnknownRepository(RepoName),
}

struct QueueState {
    pending: Vec<DeployRequest>,
    /// Projects with a deployment in flight. Readiness excludes these.
    busy_projects: HashSet<ProjectName>,
    stopped: bool,
    in_flight: usize,
    next_seq: u64,
}

struct Inner {
    state: Mutex<QueueState>,
    /// Wakes the dispatcher when pending, busy, or stop state changes.
    wake: Notify,
    runner: Arc<Runner>,
}

/// Priority queue of deployment requests with a single dispatcher task.
///
/// Admission ordering (priority, then FIFO) only applies among *ready*
/// requests: a request whose project is busy or whose dependency has not
/// succeeded yet is skipped, and lower-priority ready work runs ahead of it.
pub struct DeployQueue {
    inner: Arc<Inner>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl DeployQueue {
    pub fn new(runner: Arc<Runner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: Vec::new(),
                    busy_projects: HashSet::new(),
                    stopped: false,
                    in_flight: 0,
                    next_seq: 0,
                }),
                wake: Notify::new(),
                runner,
            }),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.inner.runner
    }

    /// Queue a deployment for `repo`.
    ///
    /// At most one pending request exists per repository: a second enqueue
    /// collapses into the first instead of queueing a duplicate run.
    pub fn enqueue(
        &self,
        repo: &RepoName,
        reason: TriggerReason,
        priority: i32,
    ) -> Result<EnqueueOutcome, QueueError> {
        if self.inner.runner.registry().get(repo).is_none() {
            return Err(QueueError::UnknownRepository(repo.clone()));
        }

        let outcome = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Err(QueueError::Stopped);
            }

            if let Some(existing) = state.pending.iter_mut().find(|r| &r.repo == repo) {
                existing.priority = existing.priority.max(priority);
                existing.reason = reason;
                EnqueueOutcome::Superseded
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.pending.push(DeployRequest {
                    repo: repo.clone(),
                    reason,
                    priority,
                    enqueued_at: chrono::Utc::now(),
                    seq,
                });
                EnqueueOutcome::Accepted
            }
        };

        tracing::debug!(repo = %repo, %reason, priority, ?outcome, "deployment queued");
        self.inner.wake.notify_one();
        Ok(outcome)
    }

    /// Enqueue with the repository's configured priority.
    pub fn trigger(
        &self,
        repo: &RepoName,
        reason: TriggerReason,
    ) -> Result<EnqueueOutcome, QueueError> {
        let priority = self
            .inner
            .runner
            .registry()
            .get(repo)
            .ok_or_else(|| QueueError::UnknownRepository(repo.clone()))?
            .priority;
        self.enqueue(repo, reason, priority)
    }

    /// Start the dispatcher. Idempotent; a second call is a no-op.
    pub fn start(&self, policy: ConcurrencyPolicy) {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let slots = Arc::new(Semaphore::new(policy.worker_slots()));
        *dispatcher = Some(tokio::spawn(async move {
            dispatch_loop(inner, slots).await;
        }));
    }

    /// Stop accepting work, discard pending requests, and wait for every
    /// in-flight deployment to finish. Running deployments are never
    /// interrupted.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            let discarded = state.pending.len();
            state.pending.clear();
            if discarded > 0 {
                tracing::info!(discarded, "discarding pending requests on shutdown");
            }
        }
        self.inner.wake.notify_one();

        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatcher task failed");
            }
        }
    }

    /// Number of requests waiting for dispatch.
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

async fn dispatch_loop(inner: Arc<Inner>, slots: Arc<Semaphore>) {
    loop {
        // Dispatch every ready request a free slot can take. try_acquire
        // failing means all slots are occupied; a finishing worker wakes us.
        while let Ok(permit) = Arc::clone(&slots).try_acquire_owned() {
            match inner.take_ready() {
                Some((request, repo)) => spawn_worker(&inner, request, repo, permit),
                None => break,
            }
        }

        {
            let state = inner.state.lock();
            if state.stopped && state.in_flight == 0 {
                return;
            }
        }

        inner.wake.notified().await;
    }
}

impl Inner {
    /// Pop the best ready request, marking its project busy.
    ///
    /// Ready means the project has no deployment in flight and the
    /// dependency, if any, has a successful latest deployment. Among ready
    /// requests the highest priority wins, FIFO on ties.
    fn take_ready(&self) -> Option<(DeployRequest, Arc<Repository>)> {
        let mut state = self.state.lock();
        if state.stopped {
            return None;
        }

        let mut best: Option<(usize, Arc<Repository>)> = None;
        for (idx, request) in state.pending.iter().enumerate() {
            let Some(repo) = self.runner.registry().get(&request.repo) else {
                continue;
            };
            if state.busy_projects.contains(&repo.project) {
                continue;
            }
            if !self.dependency_met(&repo) {
                continue;
            }
            match &best {
                Some((best_idx, _)) if !request.beats(&state.pending[*best_idx]) => {}
                _ => best = Some((idx, repo)),
            }
        }

        let (idx, repo) = best?;
        let request = state.pending.swap_remove(idx);
        state.busy_projects.insert(repo.project.clone());
        state.in_flight += 1;
        Some((request, repo))
    }

    fn dependency_met(&self, repo: &Repository) -> bool {
        let Some(dep) = &repo.depends_on else {
            return true;
        };
        self.runner
            .store()
            .latest_for(dep)
            .is_some_and(|r| r.status == DeploymentStatus::Success)
    }
}

fn spawn_worker(
    inner: &Arc<Inner>,
    request: DeployRequest,
    repo: Arc<Repository>,
    permit: OwnedSemaphorePermit,
) {
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tracing::info!(
            repo = %request.repo,
            reason = %request.reason,
            priority = request.priority,
            "dispatching deployment"
        );

        // A panic in the runner must not leave the project locked forever.
        let run = std::panic::AssertUnwindSafe(inner.runner.execute(Arc::clone(&repo)));
        if run.catch_unwind().await.is_err() {
            tracing::error!(repo = %repo.name, "deployment task panicked");
        }

        {
            let mut state = inner.state.lock();
            state.busy_projects.remove(&repo.project);
            state.in_flight -= 1;
        }
        drop(permit);
        inner.wake.notify_one();
    });
}
