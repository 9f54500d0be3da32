// ABOUTME: Secrets capability interface for encrypted env files.
// ABOUTME: Detect SOPS-encrypted files and decrypt them for compose.

mod sops;

pub use sops::SopsCli;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from secrets operations.
#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("no decryption key available for {0}")]
    MissingKey(String),

    #[error("encrypted file is malformed: {0}")]
    Malformed(String),

    #[error("decryption binary unavailable: {0}")]
    BinaryUnavailable(String),
}

/// Secrets operations: detect encryption, decrypt to a working path.
#[async_trait]
pub trait SecretsOps: Send + Sync {
    /// Whether the file at `path` looks like an encrypted secrets file.
    async fn is_encrypted(&self, path: &Path) -> Result<bool, SecretsError>;

    /// Decrypt `path` and write the plaintext to `dest`.
    async fn decrypt(&self, path: &Path, dest: &Path) -> Result<(), SecretsError>;
}
