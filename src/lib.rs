// ABOUTME: Library root for caravel - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod compose;
pub mod config;
pub mod deploy;
pub mod error;
pub mod git;
pub mod notify;
pub mod poller;
pub mod queue;
pub mod secrets;
pub mod store;
pub mod types;
