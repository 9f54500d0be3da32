// ABOUTME: Deployment queue and scheduler core.
// ABOUTME: Priority admission, per-project exclusion, dependency gating.

mod request;
mod scheduler;

pub use request::{DeployRequest, TriggerReason};
pub use scheduler::{ConcurrencyPolicy, DeployQueue, EnqueueOutcome, QueueError};
