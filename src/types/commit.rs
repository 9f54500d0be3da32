// ABOUTME: Commit hash newtype with light validation.
// ABOUTME: Stored on repositories and deployment records.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitHashError {
    #[error("commit hash cannot be empty")]
    Empty,

    #[error("invalid character in commit hash: '{0}'")]
    InvalidChar(char),
}

/// A git commit hash (full or abbreviated hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn new(value: &str) -> Result<Self, CommitHashError> {
        if value.is_empty() {
            return Err(CommitHashError::Empty);
        }
        for c in value.chars() {
            if !c.is_ascii_hexdigit() {
                return Err(CommitHashError::InvalidChar(c));
            }
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines and notifications.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
