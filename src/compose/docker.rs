// ABOUTME: Docker-backed compose adapter.
// ABOUTME: Compose CLI for bring-up, bollard API for prune and log tailing.

use super::{ComposeError, ComposeOps, PruneError};
use async_trait::async_trait;
use bollard::query_parameters::{LogsOptions, PruneImagesOptions};
use bollard::Docker;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Compose file names probed in order inside the project directory.
const COMPOSE_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Container adapter combining the `docker compose` CLI (compose has no
/// API equivalent) with the Docker Engine API for prune and log reads.
pub struct DockerCompose {
    client: Docker,
}

impl DockerCompose {
    pub fn connect() -> Result<Self, ComposeError> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| ComposeError::Runtime(e.to_string()))?;
        Ok(Self { client })
    }

    fn find_compose_file(dir: &Path) -> Result<PathBuf, ComposeError> {
        for name in COMPOSE_FILES {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(ComposeError::NoComposeFile(dir.display().to_string()))
    }

    fn forward_lines<R>(reader: R, output: mpsc::Sender<String>) -> tokio::task::JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                // Receiver gone means the deployment is being torn down;
                // dropping output is fine.
                if output.send(line).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl ComposeOps for DockerCompose {
    async fn bring_up(
        &self,
        dir: &Path,
        project: &str,
        timeout: Duration,
        output: mpsc::Sender<String>,
    ) -> Result<(), ComposeError> {
        let compose_file = Self::find_compose_file(dir)?;

        let mut child = Command::new("docker")
            .arg("compose")
            .arg("-f")
            .arg(&compose_file)
            .args(["up", "-d"])
            .current_dir(dir)
            // A stable project name keyed by repository makes the stack's
            // containers findable later via the compose project label.
            .env("COMPOSE_PROJECT_NAME", format!("caravel_{project}"))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ComposeError::Runtime("compose stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ComposeError::Runtime("compose stderr not captured".into()))?;

        let out_task = Self::forward_lines(stdout, output.clone());
        let err_task = Self::forward_lines(stderr, output);

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                out_task.abort();
                err_task.abort();
                return Err(ComposeError::Timeout { timeout });
            }
        };

        // Drain whatever the forwarders still hold before reporting.
        let _ = out_task.await;
        let _ = err_task.await;

        if status.success() {
            Ok(())
        } else {
            Err(ComposeError::NonZeroExit {
                code: status.code().unwrap_or(-1),
            })
        }
    }

    async fn prune_images(&self) -> Result<u64, PruneError> {
        let response = self
            .client
            .prune_images(None::<PruneImagesOptions>)
            .await
            .map_err(|e| PruneError(e.to_string()))?;

        Ok(response.space_reclaimed.unwrap_or(0).max(0) as u64)
    }

    async fn tail_logs(&self, container: &str, lines: u64) -> Result<String, ComposeError> {
        let opts = LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            tail: lines.to_string(),
            ..Default::default()
        };

        let mut stream = self.client.logs(container, Some(opts));
        let mut collected = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ComposeError::Runtime(e.to_string()))?;
            collected.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }

        Ok(collected)
    }
}
