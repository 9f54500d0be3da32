// ABOUTME: Deployment state machine using the type state pattern.
// ABOUTME: One attempt = check, sync, secrets, reconcile, finalize, notify.

mod attempt;
mod error;
mod runner;
mod state;

pub use attempt::{Attempt, ChangeCheck};
pub use error::{DeployError, Step};
pub use runner::{Adapters, Runner, RunnerOptions};
pub use state::{Checked, Reconciled, SecretsReady, Started, Synced};
