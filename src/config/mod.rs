// ABOUTME: Configuration types and parsing for caravel.yml.
// ABOUTME: Projects, repositories, timeouts, and notification target merging.

use crate::error::{Error, Result};
use crate::types::{ProjectName, RepoName};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "caravel.yml";
pub const CONFIG_FILENAME_ALT: &str = "caravel.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,

    /// Projects keyed by name. BTreeMap keeps sync order deterministic.
    pub projects: BTreeMap<ProjectName, ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker slots for the deployment queue. 1 means strictly sequential.
    pub concurrency: usize,

    /// Prune unused images after a successful deployment.
    pub prune_images: bool,

    /// Timeout applied to each subprocess-driving step (pull, decrypt,
    /// compose up).
    #[serde(with = "humantime_serde")]
    pub step_timeout: Duration,

    /// Timeout for a single notification dispatch.
    #[serde(with = "humantime_serde")]
    pub notify_timeout: Duration,

    /// Directory for the deployment journal.
    pub state_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            prune_images: false,
            step_timeout: Duration::from_secs(600),
            notify_timeout: Duration::from_secs(30),
            state_dir: PathBuf::from(".caravel/state"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Auth token used for private repositories in this project.
    #[serde(default)]
    pub token: Option<String>,

    /// Project-level default notification targets, merged into every
    /// repository's own lists.
    #[serde(default)]
    pub notifications: NotificationTargets,

    pub repositories: BTreeMap<RepoName, RepoConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub git_url: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Subdirectory containing the compose file, relative to the checkout.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Local working copy. Must be unique across all repositories.
    pub local_path: PathBuf,

    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// SOPS-encrypted env file, relative to the compose directory.
    #[serde(default)]
    pub env_file: Option<PathBuf>,

    /// Repository in the same project that must have deployed successfully
    /// before this one is admitted.
    #[serde(default)]
    pub depends_on: Option<RepoName>,

    /// Priority weight among simultaneously ready candidates.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub notifications: NotificationTargets,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(300)
}

/// Notification URLs per event. Lists are non-empty when present; an absent
/// event means "do not notify".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationTargets {
    #[serde(default)]
    pub success: Option<NonEmpty<String>>,

    #[serde(default)]
    pub failure: Option<NonEmpty<String>>,
}

impl NotificationTargets {
    /// Merge repository targets with project defaults. Repository URLs come
    /// first, then project-level URLs, duplicates removed.
    pub fn merged_with(&self, defaults: &NotificationTargets) -> NotificationTargets {
        NotificationTargets {
            success: merge_lists(&self.success, &defaults.success),
            failure: merge_lists(&self.failure, &defaults.failure),
        }
    }

    pub fn for_success(&self) -> Vec<String> {
        self.success
            .as_ref()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn for_failure(&self) -> Vec<String> {
        self.failure
            .as_ref()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn merge_lists(
    own: &Option<NonEmpty<String>>,
    defaults: &Option<NonEmpty<String>>,
) -> Option<NonEmpty<String>> {
    let mut seen = HashSet::new();
    let combined: Vec<String> = own
        .iter()
        .flat_map(|l| l.iter())
        .chain(defaults.iter().flat_map(|l| l.iter()))
        .filter(|url| seen.insert((*url).clone()))
        .cloned()
        .collect();
    NonEmpty::from_vec(combined)
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|_| Error::ConfigNotFound(path.to_path_buf()))?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Look for caravel.yml / caravel.yaml in the given directory.
    pub fn discover(dir: &Path) -> Result<Self> {
        for name in [CONFIG_FILENAME, CONFIG_FILENAME_ALT] {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Self::load(&candidate);
            }
        }
        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Structural validation beyond what serde enforces.
    ///
    /// - local paths are unique across all repositories (working
    ///   directories are never shared)
    /// - `depends_on` references a repository in the same project, and not
    ///   the repository itself
    pub fn validate(&self) -> Result<()> {
        let mut paths: HashSet<&Path> = HashSet::new();

        for (project_name, project) in &self.projects {
            if project.repositories.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "project '{project_name}' has no repositories"
                )));
            }

            for (repo_name, repo) in &project.repositories {
                if !paths.insert(repo.local_path.as_path()) {
                    return Err(Error::InvalidConfig(format!(
                        "local_path '{}' is shared by more than one repository",
                        repo.local_path.display()
                    )));
                }

                if let Some(dep) = &repo.depends_on {
                    if dep == repo_name {
                        return Err(Error::InvalidConfig(format!(
                            "repository '{repo_name}' depends on itself"
                        )));
                    }
                    if !project.repositories.contains_key(dep) {
                        return Err(Error::InvalidConfig(format!(
                            "repository '{repo_name}' depends on unknown repository '{dep}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
settings:
  concurrency: 2
  prune_images: true
  step_timeout: 5m
projects:
  homelab:
    notifications:
      failure: ["discord://token@channel"]
    repositories:
      media:
        git_url: https://github.com/example/media.git
        branch: main
        local_path: /srv/repos/media
        poll_interval: 2m
        priority: 5
      backups:
        git_url: https://github.com/example/backups.git
        local_path: /srv/repos/backups
        depends_on: media
        env_file: .env.enc
        notifications:
          failure: ["ntfy://host/backups"]
"#;

    #[test]
    fn parses_sample_config() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.settings.concurrency, 2);
        assert!(config.settings.prune_images);
        assert_eq!(config.settings.step_timeout, Duration::from_secs(300));

        let project = &config.projects[&ProjectName::new("homelab").unwrap()];
        let media = &project.repositories[&RepoName::new("media").unwrap()];
        assert_eq!(media.branch, "main");
        assert_eq!(media.poll_interval, Duration::from_secs(120));
        assert_eq!(media.priority, 5);

        let backups = &project.repositories[&RepoName::new("backups").unwrap()];
        assert_eq!(backups.branch, "main");
        assert_eq!(backups.depends_on, Some(RepoName::new("media").unwrap()));
        assert_eq!(backups.env_file, Some(PathBuf::from(".env.enc")));
    }

    #[test]
    fn merges_notification_targets_with_defaults() {
        let config: Config = serde_yaml::from_str(SAMPLE).unwrap();
        let project = &config.projects[&ProjectName::new("homelab").unwrap()];
        let backups = &project.repositories[&RepoName::new("backups").unwrap()];

        let merged = backups.notifications.merged_with(&project.notifications);
        assert_eq!(
            merged.for_failure(),
            vec![
                "ntfy://host/backups".to_string(),
                "discord://token@channel".to_string()
            ]
        );
        assert!(merged.for_success().is_empty());
    }

    #[test]
    fn merge_deduplicates_urls() {
        let own = NotificationTargets {
            success: NonEmpty::from_vec(vec!["a".into(), "b".into()]),
            failure: None,
        };
        let defaults = NotificationTargets {
            success: NonEmpty::from_vec(vec!["b".into(), "c".into()]),
            failure: None,
        };
        let merged = own.merged_with(&defaults);
        assert_eq!(merged.for_success(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_shared_local_path() {
        let yaml = r#"
projects:
  p:
    repositories:
      a:
        git_url: https://example.com/a.git
        local_path: /srv/shared
      b:
        git_url: https://example.com/b.git
        local_path: /srv/shared
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let yaml = r#"
projects:
  p:
    repositories:
      a:
        git_url: https://example.com/a.git
        local_path: /srv/a
        depends_on: ghost
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_self_dependency() {
        let yaml = r#"
projects:
  p:
    repositories:
      a:
        git_url: https://example.com/a.git
        local_path: /srv/a
        depends_on: a
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }
}
