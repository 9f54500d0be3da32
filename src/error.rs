// ABOUTME: Application-wide error types for caravel.
// ABOUTME: Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    #[error("repository '{repo}' is blocked on dependency '{dep}', which has no successful deployment")]
    DependencyBlocked { repo: String, dep: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
