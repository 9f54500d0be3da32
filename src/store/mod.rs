// ABOUTME: Owned state of the orchestrator: deployment records and the
// ABOUTME: repository registry with the current-state view.

mod deployments;
mod registry;

pub use deployments::{DeploymentRecord, DeploymentStatus, DeploymentStore};
pub(crate) use deployments::NO_CHANGE_MARKER;
pub use registry::{Registry, RepoState, Repository};
