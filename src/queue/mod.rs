pub mod task;

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::Instrument;

use crate::server::AppState;
use crate::workflow::{self, WorkflowOutcome};

use task::Task;

/// FIFO of accepted tasks, drained by a single processor.
#[derive(Default)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    /// Notification channel for the processor.
    notify: Option<UnboundedSender<()>>,
    closed: bool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notifier(&mut self, tx: UnboundedSender<()>) {
        if self.closed {
            return;
        }
        self.notify = Some(tx);
    }

    /// Append a task. Returns `false` once the queue has been closed.
    pub fn enqueue(&mut self, task: Task) -> bool {
        if self.closed {
            tracing::warn!(task = %task.description(), "Queue closed, rejecting task");
            return false;
        }

        tracing::info!(task = %task.description(), queued = self.pending.len(), "Enqueuing task");
        self.pending.push_back(task);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
        true
    }

    pub fn take_next(&mut self) -> Option<Task> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Stop accepting work and drop everything still waiting.
    ///
    /// Returns the number of dropped tasks. Dropping the notifier lets the
    /// processor loop finish once the running task completes.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.notify = None;
        let dropped = self.pending.len();
        for task in self.pending.drain(..) {
            tracing::warn!(task = %task.description(), "Dropping queued task on shutdown");
        }
        dropped
    }
}

fn log_outcome(task: &Task, outcome: &WorkflowOutcome) {
    match outcome {
        WorkflowOutcome::Published { url } => {
            tracing::info!(task = %task.description(), url = %url, "Task published");
        }
        WorkflowOutcome::NoOpAborted { reason } => {
            tracing::info!(task = %task.description(), reason = %reason, "Task ended without changes");
        }
        WorkflowOutcome::Failed { reason } => {
            tracing::error!(task = %task.description(), error = %reason, "Task failed");
        }
    }
}

/// Run the background queue processor until the queue is closed.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = unbounded_channel::<()>();

    {
        let mut queue = state.task_queue.write().await;
        queue.set_notifier(tx);
    }

    tracing::info!("Queue processor started");

    while rx.recv().await.is_some() {
        loop {
            let task = {
                let mut queue = state.task_queue.write().await;
                queue.take_next()
            };

            let Some(task) = task else {
                break;
            };

            let span = tracing::info_span!("task", repo = %task.repo_full_name());
            let outcome = async {
                tracing::info!(task = %task.description(), "Processing task");
                workflow::execute(&state, &task).await
            }
            .instrument(span)
            .await;
            log_outcome(&task, &outcome);
        }
    }

    tracing::info!("Queue processor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{review_task, test_state, FakePlatform, ScriptedModel};
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let mut queue = TaskQueue::new();
        queue.enqueue(review_task("o/a", 1));
        queue.enqueue(review_task("o/b", 2));
        queue.enqueue(review_task("o/a", 3));

        let order: Vec<_> = std::iter::from_fn(|| queue.take_next())
            .map(|t| t.description())
            .collect();
        assert_eq!(
            order,
            vec![
                "Respond to review on PR #1 on o/a",
                "Respond to review on PR #2 on o/b",
                "Respond to review on PR #3 on o/a",
            ]
        );
    }

    #[test]
    fn test_close_drops_pending_and_rejects_new_work() {
        let mut queue = TaskQueue::new();
        queue.enqueue(review_task("o/a", 1));
        queue.enqueue(review_task("o/a", 2));

        assert_eq!(queue.close(), 2);
        assert!(queue.is_empty());
        assert!(!queue.enqueue(review_task("o/a", 3)));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_enqueue_notifies_processor() {
        let (tx, mut rx) = unbounded_channel();
        let mut queue = TaskQueue::new();
        queue.set_notifier(tx);

        queue.enqueue(review_task("o/a", 1));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_processor_drains_queue_and_stops_on_close() {
        let tmp = tempfile::tempdir().unwrap();
        let state = Arc::new(test_state(
            tmp.path(),
            Arc::new(FakePlatform::default()),
            Arc::new(ScriptedModel::new(Vec::new())),
            None,
        ));

        let processor = tokio::spawn(run_queue_processor(Arc::clone(&state)));

        // Wait until the processor has registered itself.
        for _ in 0..100 {
            if state.task_queue.read().await.notify.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // The clone URL points nowhere, so the run fails fast.
        state.task_queue.write().await.enqueue(review_task("o/a", 1));
        for _ in 0..500 {
            if state.task_queue.read().await.is_empty() && !state.workspaces.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        state.task_queue.write().await.close();
        tokio::time::timeout(Duration::from_secs(10), processor)
            .await
            .unwrap()
            .unwrap();
    }
}
