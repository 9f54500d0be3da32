// ABOUTME: Repository registry built from validated configuration.
// ABOUTME: Tracks last deployed commits and exposes the current-state view.

use crate::config::{Config, NotificationTargets};
use crate::store::DeploymentStore;
use crate::types::{CommitHash, ProjectName, RepoName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A deployable unit resolved from configuration. Everything here is
/// immutable after config sync; the deployed commit lives in the registry.
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: RepoName,
    pub project: ProjectName,
    pub git_url: String,
    pub branch: String,
    /// Subdirectory containing the compose file, relative to `local_path`.
    pub path: Option<PathBuf>,
    /// Working copy, exclusive to this repository.
    pub local_path: PathBuf,
    pub poll_interval: Duration,
    pub env_file: Option<PathBuf>,
    pub depends_on: Option<RepoName>,
    pub priority: i32,
    pub token: Option<String>,
    /// Notification URLs with project defaults already merged in.
    pub notifications: NotificationTargets,
}

impl Repository {
    /// Directory the compose file lives in.
    pub fn compose_dir(&self) -> PathBuf {
        match &self.path {
            Some(sub) => self.local_path.join(sub),
            None => self.local_path.clone(),
        }
    }
}

/// Current state of a repository for status surfaces.
#[derive(Debug, Clone)]
pub struct RepoState {
    pub last_commit_hash: Option<CommitHash>,
    pub deploying: bool,
}

/// All known repositories plus their last deployed commit hashes.
///
/// The hash map is the only mutable part and is advanced exclusively by
/// successful deployments.
pub struct Registry {
    repos: HashMap<RepoName, Arc<Repository>>,
    hashes: RwLock<HashMap<RepoName, CommitHash>>,
}

impl Registry {
    /// Build the registry from a validated config, seeding deployed hashes
    /// from the store's journal so restarts do not redeploy unchanged
    /// stacks.
    pub fn from_config(config: &Config, store: &DeploymentStore) -> Self {
        let mut repos = HashMap::new();
        let mut hashes = HashMap::new();

        for (project_name, project) in &config.projects {
            for (repo_name, repo) in &project.repositories {
                let resolved = Repository {
                    name: repo_name.clone(),
                    project: project_name.clone(),
                    git_url: repo.git_url.clone(),
                    branch: repo.branch.clone(),
                    path: repo.path.clone(),
                    local_path: repo.local_path.clone(),
                    poll_interval: repo.poll_interval,
                    env_file: repo.env_file.clone(),
                    depends_on: repo.depends_on.clone(),
                    priority: repo.priority,
                    token: project.token.clone(),
                    notifications: repo.notifications.merged_with(&project.notifications),
                };

                if let Some(hash) = store.latest_success_commit(repo_name) {
                    hashes.insert(repo_name.clone(), hash);
                }
                repos.insert(repo_name.clone(), Arc::new(resolved));
            }
        }

        Self {
            repos,
            hashes: RwLock::new(hashes),
        }
    }

    pub fn get(&self, name: &RepoName) -> Option<Arc<Repository>> {
        self.repos.get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Repository>> {
        let mut repos: Vec<_> = self.repos.values().cloned().collect();
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        repos
    }

    pub fn last_commit_hash(&self, name: &RepoName) -> Option<CommitHash> {
        self.hashes.read().get(name).cloned()
    }

    /// Advance the deployed commit. Only the finalize step of a successful
    /// deployment calls this.
    pub fn advance_hash(&self, name: &RepoName, hash: CommitHash) {
        self.hashes.write().insert(name.clone(), hash);
    }

    /// Current-state view for status surfaces.
    pub fn current_state(&self, name: &RepoName, store: &DeploymentStore) -> Option<RepoState> {
        self.repos.get(name)?;
        Some(RepoState {
            last_commit_hash: self.last_commit_hash(name),
            deploying: store.is_active(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeploymentStatus;

    fn sample_config() -> Config {
        serde_yaml::from_str(
            r#"
projects:
  homelab:
    notifications:
      failure: ["discord://x"]
    repositories:
      media:
        git_url: https://example.com/media.git
        local_path: /srv/media
        priority: 3
      backups:
        git_url: https://example.com/backups.git
        local_path: /srv/backups
        path: stack
        depends_on: media
"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_repositories_with_merged_notifications() {
        let store = DeploymentStore::in_memory();
        let registry = Registry::from_config(&sample_config(), &store);

        let media = registry.get(&RepoName::new("media").unwrap()).unwrap();
        assert_eq!(media.project, ProjectName::new("homelab").unwrap());
        assert_eq!(media.priority, 3);
        assert_eq!(media.notifications.for_failure(), vec!["discord://x"]);

        let backups = registry.get(&RepoName::new("backups").unwrap()).unwrap();
        assert_eq!(backups.compose_dir(), PathBuf::from("/srv/backups/stack"));
        assert_eq!(backups.depends_on, Some(RepoName::new("media").unwrap()));
    }

    #[test]
    fn seeds_hashes_from_journalled_successes() {
        let store = DeploymentStore::in_memory();
        let media = RepoName::new("media").unwrap();
        let id = store.create(&media);
        store.mark_running(id);
        store.set_commit(id, CommitHash::new("c0ffee").unwrap());
        store.finish(id, DeploymentStatus::Success);

        let registry = Registry::from_config(&sample_config(), &store);
        assert_eq!(
            registry.last_commit_hash(&media),
            Some(CommitHash::new("c0ffee").unwrap())
        );
    }

    #[test]
    fn current_state_reflects_running_deployment() {
        let store = DeploymentStore::in_memory();
        let registry = Registry::from_config(&sample_config(), &store);
        let media = RepoName::new("media").unwrap();

        let state = registry.current_state(&media, &store).unwrap();
        assert!(!state.deploying);
        assert!(state.last_commit_hash.is_none());

        let id = store.create(&media);
        store.mark_running(id);
        let state = registry.current_state(&media, &store).unwrap();
        assert!(state.deploying);
        let _ = id;
    }
}
