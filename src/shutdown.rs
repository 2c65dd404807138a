use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use crate::server::AppState;

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Stop taking work and give the in-flight run up to `grace` to finish.
///
/// Returns `false` if a run still held its workspace lease when time ran out.
pub async fn graceful_shutdown(state: &Arc<AppState>, grace: Duration) -> bool {
    tracing::info!("Starting graceful shutdown...");

    let dropped = state.task_queue.write().await.close();
    if dropped > 0 {
        tracing::warn!(dropped, "Queued tasks discarded");
    }

    if !state.workspaces.is_busy() {
        tracing::info!("No workflow in flight");
        return true;
    }

    tracing::info!(grace_secs = grace.as_secs(), "Waiting for in-flight workflow");
    match tokio::time::timeout(grace, state.workspaces.wait_idle()).await {
        Ok(()) => {
            tracing::info!("Graceful shutdown complete");
            true
        }
        Err(_) => {
            tracing::warn!("In-flight workflow did not finish in time; its working copy will be reset on next use");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{review_task, test_state, FakePlatform, ScriptedModel};

    fn state(root: &std::path::Path) -> Arc<AppState> {
        Arc::new(test_state(
            root,
            Arc::new(FakePlatform::default()),
            Arc::new(ScriptedModel::new(Vec::new())),
            None,
        ))
    }

    #[tokio::test]
    async fn test_idle_shutdown_closes_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        state.task_queue.write().await.enqueue(review_task("o/r", 1));

        assert!(graceful_shutdown(&state, Duration::from_millis(10)).await);
        assert!(state.task_queue.read().await.is_empty());
        assert!(!state.task_queue.write().await.enqueue(review_task("o/r", 2)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_lease_release() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let lease = state.workspaces.acquire("o/r").await;

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(lease);
        });

        assert!(graceful_shutdown(&state, Duration::from_secs(5)).await);
        release.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_after_grace() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state(tmp.path());
        let _lease = state.workspaces.acquire("o/r").await;

        assert!(!graceful_shutdown(&state, Duration::from_millis(20)).await);
    }
}
