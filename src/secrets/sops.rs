// ABOUTME: SOPS-based secrets adapter driving the sops binary.
// ABOUTME: Decrypts .env.enc style files into the compose directory.

use super::{SecretsError, SecretsOps};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// Secrets adapter backed by the `sops` CLI (age or PGP keys).
#[derive(Debug, Default)]
pub struct SopsCli;

impl SopsCli {
    pub fn new() -> Self {
        Self
    }

    fn classify(stderr: &str, path: &Path) -> SecretsError {
        let lower = stderr.to_lowercase();
        if lower.contains("no key") || lower.contains("could not decrypt") {
            SecretsError::MissingKey(path.display().to_string())
        } else {
            SecretsError::Malformed(stderr.trim().to_string())
        }
    }
}

#[async_trait]
impl SecretsOps for SopsCli {
    async fn is_encrypted(&self, path: &Path) -> Result<bool, SecretsError> {
        // Heuristic from the sops file format: encrypted documents carry a
        // top-level `sops` metadata block.
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(_) => return Ok(false),
        };
        Ok(contents.contains("sops:") || contents.contains("\"sops\""))
    }

    async fn decrypt(&self, path: &Path, dest: &Path) -> Result<(), SecretsError> {
        let output = Command::new("sops")
            .arg("-d")
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SecretsError::BinaryUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify(&stderr, path));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SecretsError::Malformed(e.to_string()))?;
        }
        tokio::fs::write(dest, &output.stdout)
            .await
            .map_err(|e| SecretsError::Malformed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn detects_sops_metadata_block() {
        let dir = tempfile::tempdir().unwrap();
        let enc = dir.path().join(".env.enc");
        tokio::fs::write(&enc, "DB_PASSWORD: ENC[AES256_GCM,...]\nsops:\n  version: 3.8.1\n")
            .await
            .unwrap();
        let plain = dir.path().join(".env");
        tokio::fs::write(&plain, "DB_PASSWORD=hunter2\n").await.unwrap();

        let sops = SopsCli::new();
        assert!(sops.is_encrypted(&enc).await.unwrap());
        assert!(!sops.is_encrypted(&plain).await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_is_not_encrypted() {
        let sops = SopsCli::new();
        let missing = PathBuf::from("/nonexistent/.env.enc");
        assert!(!sops.is_encrypted(&missing).await.unwrap());
    }

    #[test]
    fn classifies_missing_key_errors() {
        let err = SopsCli::classify(
            "Failed to get the data key required to decrypt: no key could decrypt",
            Path::new("/srv/x/.env.enc"),
        );
        assert!(matches!(err, SecretsError::MissingKey(_)));
    }
}
