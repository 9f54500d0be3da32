// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent name confusion at compile time.

mod commit;
mod name;

pub use commit::{CommitHash, CommitHashError};
pub use name::{Name, NameError, ProjectName, RepoName};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Auto-incrementing identifier of a deployment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(pub u64);

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
