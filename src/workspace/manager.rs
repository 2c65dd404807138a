use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::WorkspaceConfig;
use crate::error::{AppError, Result};
use crate::workspace::git;

/// Owns the on-disk working copies and the lock that serializes workflow runs.
pub struct WorkspaceManager {
    base_dir: PathBuf,
    run_lock: Arc<Mutex<()>>,
}

/// Exclusive hold on the working copy of one repository.
///
/// The run lock is released when the lease is dropped, whatever the exit path.
pub struct WorkspaceLease {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceManager {
    pub fn new(config: &WorkspaceConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wait for the run lock and hand out the working copy for `repo_full_name`.
    pub async fn acquire(&self, repo_full_name: &str) -> WorkspaceLease {
        let guard = Arc::clone(&self.run_lock).lock_owned().await;
        tracing::debug!(repo = repo_full_name, "Acquired workspace lease");
        WorkspaceLease {
            path: self.workspace_path(repo_full_name),
            _guard: guard,
        }
    }

    /// Whether a workflow currently holds a lease.
    pub fn is_busy(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Wait until no workflow holds a lease.
    pub async fn wait_idle(&self) {
        drop(self.run_lock.lock().await);
    }

    fn workspace_path(&self, repo_full_name: &str) -> PathBuf {
        let safe_name = repo_full_name.replace('/', "__");
        self.base_dir.join(safe_name)
    }
}

impl WorkspaceLease {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bring the working copy to the remote tip of `default_branch`.
    ///
    /// An existing copy is reused (fetch + hard reset, untracked files removed);
    /// otherwise the repository is cloned fresh.
    pub async fn ensure_updated(&self, clone_url: &str, default_branch: &str, token: &str) -> Result<()> {
        if self.path.join(".git").is_dir() {
            tracing::info!(path = %self.path.display(), "Updating existing working copy");
            git::update_default_branch(&self.path, clone_url, default_branch, token).await
        } else {
            if self.path.exists() {
                // Leftover from an interrupted clone.
                tokio::fs::remove_dir_all(&self.path)
                    .await
                    .map_err(|e| AppError::Workspace(format!("Failed to clean workspace: {e}")))?;
            }
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::Workspace(format!("Failed to create workspace dir: {e}")))?;
            }

            tracing::info!(path = %self.path.display(), "Cloning repository");
            git::clone(clone_url, &self.path, token).await?;
            git::update_default_branch(&self.path, clone_url, default_branch, token).await
        }
    }
}
