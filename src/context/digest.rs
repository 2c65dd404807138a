use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::DigestConfig;
use crate::error::{AppError, Result};

/// Produces a textual summary of a working copy for the model.
#[async_trait]
pub trait CodeDigester: Send + Sync {
    async fn digest(&self, repo_root: &Path) -> Result<String>;
}

/// Runs an external ingestion tool (`gitingest` by default) and reads the file
/// it writes.
pub struct CommandDigester {
    config: DigestConfig,
}

impl CommandDigester {
    pub fn new(config: DigestConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CodeDigester for CommandDigester {
    async fn digest(&self, repo_root: &Path) -> Result<String> {
        let run_dir = repo_root.join(&self.config.source_dir);
        let output_path = run_dir.join(&self.config.output_file);

        if !run_dir.is_dir() {
            return Err(AppError::DigestUnavailable(format!(
                "source directory {} does not exist",
                run_dir.display()
            )));
        }

        // A stale file from an earlier run must not be mistaken for fresh output.
        if output_path.exists() {
            tokio::fs::remove_file(&output_path).await?;
        }

        tracing::info!(
            command = %self.config.command,
            dir = %run_dir.display(),
            "Building code digest"
        );
        let output = Command::new(&self.config.command)
            .args(&self.config.args)
            .current_dir(&run_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                AppError::DigestUnavailable(format!(
                    "failed to run {}: {e}",
                    self.config.command
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::DigestUnavailable(format!(
                "{} exited with {}: {}",
                self.config.command,
                output.status,
                stderr.trim()
            )));
        }

        let digest = match tokio::fs::read(&output_path).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                return Err(AppError::DigestUnavailable(format!(
                    "{} was not produced: {e}",
                    output_path.display()
                )))
            }
        };

        // The digest must never end up in a commit.
        tokio::fs::remove_file(&output_path).await?;

        tracing::debug!(bytes = digest.len(), "Code digest ready");
        Ok(digest)
    }
}
