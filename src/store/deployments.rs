// ABOUTME: Append-only deployment record store with a JSONL journal.
// ABOUTME: Single writer per record, concurrent readers, auto-increment ids.

use crate::types::{CommitHash, DeploymentId, RepoName};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Lifecycle of a deployment attempt. Success and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The durable record of one deployment attempt. This is the audit trail
/// and the source of truth for what is currently deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub repo: RepoName,
    /// Target commit, filled in once the change check resolves it.
    pub commit_hash: Option<CommitHash>,
    pub status: DeploymentStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Step log, append-only while the deployment runs.
    pub log: Vec<String>,
}

/// Log marker written when the change check finds nothing to deploy.
pub(crate) const NO_CHANGE_MARKER: &str = "no changes detected, nothing to deploy";

struct Inner {
    records: BTreeMap<DeploymentId, DeploymentRecord>,
    next_id: u64,
}

/// In-memory record store journalled to `deployments.jsonl`.
///
/// Records are only ever appended; a record mutates only by forward status
/// transitions and log growth while running. Readers may observe a growing
/// log on a running deployment.
pub struct DeploymentStore {
    inner: RwLock<Inner>,
    journal: Option<Mutex<File>>,
}

impl DeploymentStore {
    /// Purely in-memory store, used by tests and one-shot runs.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: BTreeMap::new(),
                next_id: 1,
            }),
            journal: None,
        }
    }

    /// Open the store backed by `state_dir/deployments.jsonl`, replaying any
    /// existing journal so ids keep incrementing and history survives
    /// restarts.
    pub fn open(state_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("deployments.jsonl");

        let mut records = BTreeMap::new();
        let mut next_id = 1u64;

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DeploymentRecord>(&line) {
                    Ok(record) => {
                        next_id = next_id.max(record.id.0 + 1);
                        records.insert(record.id, record);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable journal line");
                    }
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            inner: RwLock::new(Inner { records, next_id }),
            journal: Some(Mutex::new(file)),
        })
    }

    /// Create a new Pending record and return its id.
    pub fn create(&self, repo: &RepoName) -> DeploymentId {
        let mut inner = self.inner.write();
        let id = DeploymentId(inner.next_id);
        inner.next_id += 1;
        inner.records.insert(
            id,
            DeploymentRecord {
                id,
                repo: repo.clone(),
                commit_hash: None,
                status: DeploymentStatus::Pending,
                started_at: Utc::now(),
                finished_at: None,
                log: Vec::new(),
            },
        );
        id
    }

    /// Pending -> Running.
    pub fn mark_running(&self, id: DeploymentId) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(&id) {
            if record.status == DeploymentStatus::Pending {
                record.status = DeploymentStatus::Running;
            }
        }
    }

    /// Record the commit this deployment targets.
    pub fn set_commit(&self, id: DeploymentId, hash: CommitHash) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(&id) {
            record.commit_hash = Some(hash);
        }
    }

    /// Append one line to a non-terminal record's log.
    pub fn append_log(&self, id: DeploymentId, line: impl Into<String>) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(&id) {
            if !record.status.is_terminal() {
                record.log.push(line.into());
            }
        }
    }

    /// Transition to a terminal status and journal the finished record.
    pub fn finish(&self, id: DeploymentId, status: DeploymentStatus) {
        debug_assert!(status.is_terminal());

        let finished = {
            let mut inner = self.inner.write();
            match inner.records.get_mut(&id) {
                Some(record) if !record.status.is_terminal() => {
                    record.status = status;
                    record.finished_at = Some(Utc::now());
                    Some(record.clone())
                }
                _ => None,
            }
        };

        if let (Some(record), Some(journal)) = (finished, &self.journal) {
            match serde_json::to_string(&record) {
                Ok(line) => {
                    let mut file = journal.lock();
                    if let Err(e) = writeln!(file, "{line}") {
                        tracing::warn!(deployment = %id, error = %e, "journal write failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(deployment = %id, error = %e, "journal encode failed");
                }
            }
        }
    }

    pub fn get(&self, id: DeploymentId) -> Option<DeploymentRecord> {
        self.inner.read().records.get(&id).cloned()
    }

    /// Most recent record for a repository, running or terminal.
    pub fn latest_for(&self, repo: &RepoName) -> Option<DeploymentRecord> {
        self.inner
            .read()
            .records
            .values()
            .rev()
            .find(|r| &r.repo == repo)
            .cloned()
    }

    /// Commit of the most recent successful deployment for a repository.
    pub fn latest_success_commit(&self, repo: &RepoName) -> Option<CommitHash> {
        self.inner
            .read()
            .records
            .values()
            .rev()
            .find(|r| &r.repo == repo && r.status == DeploymentStatus::Success)
            .and_then(|r| r.commit_hash.clone())
    }

    /// True while a deployment for `repo` is pending or running.
    pub fn is_active(&self, repo: &RepoName) -> bool {
        self.latest_for(repo)
            .is_some_and(|r| !r.status.is_terminal())
    }

    /// Records for the reporting surface, newest first, optionally filtered.
    pub fn list(&self, repo: Option<&RepoName>, limit: usize) -> Vec<DeploymentRecord> {
        self.inner
            .read()
            .records
            .values()
            .rev()
            .filter(|r| repo.is_none_or(|name| &r.repo == name))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> RepoName {
        RepoName::new(name).unwrap()
    }

    #[test]
    fn ids_increment_and_records_start_pending() {
        let store = DeploymentStore::in_memory();
        let a = store.create(&repo("media"));
        let b = store.create(&repo("media"));
        assert!(b > a);
        assert_eq!(store.get(a).unwrap().status, DeploymentStatus::Pending);
    }

    #[test]
    fn log_grows_only_while_non_terminal() {
        let store = DeploymentStore::in_memory();
        let id = store.create(&repo("media"));
        store.mark_running(id);
        store.append_log(id, "pulling");
        store.finish(id, DeploymentStatus::Success);
        store.append_log(id, "after the fact");

        let record = store.get(id).unwrap();
        assert_eq!(record.log, vec!["pulling".to_string()]);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn finish_is_idempotent_and_terminal() {
        let store = DeploymentStore::in_memory();
        let id = store.create(&repo("media"));
        store.mark_running(id);
        store.finish(id, DeploymentStatus::Failed);
        store.finish(id, DeploymentStatus::Success);
        assert_eq!(store.get(id).unwrap().status, DeploymentStatus::Failed);
    }

    #[test]
    fn latest_success_commit_skips_failures() {
        let store = DeploymentStore::in_memory();

        let ok = store.create(&repo("media"));
        store.mark_running(ok);
        store.set_commit(ok, CommitHash::new("aaa111").unwrap());
        store.finish(ok, DeploymentStatus::Success);

        let bad = store.create(&repo("media"));
        store.mark_running(bad);
        store.set_commit(bad, CommitHash::new("bbb222").unwrap());
        store.finish(bad, DeploymentStatus::Failed);

        assert_eq!(
            store.latest_success_commit(&repo("media")),
            Some(CommitHash::new("aaa111").unwrap())
        );
    }

    #[test]
    fn journal_replay_restores_history_and_ids() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = DeploymentStore::open(dir.path()).unwrap();
            let id = store.create(&repo("media"));
            store.mark_running(id);
            store.set_commit(id, CommitHash::new("abc123").unwrap());
            store.finish(id, DeploymentStatus::Success);
        }

        let reopened = DeploymentStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.latest_success_commit(&repo("media")),
            Some(CommitHash::new("abc123").unwrap())
        );
        let next = reopened.create(&repo("media"));
        assert_eq!(next, DeploymentId(2));
    }

    #[test]
    fn is_active_tracks_running_state() {
        let store = DeploymentStore::in_memory();
        let id = store.create(&repo("media"));
        assert!(store.is_active(&repo("media")));
        store.mark_running(id);
        assert!(store.is_active(&repo("media")));
        store.finish(id, DeploymentStatus::Success);
        assert!(!store.is_active(&repo("media")));
    }
}
