use crate::error::AppError;

/// Terminal result of one workflow run. Logged, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Changes were pushed; `url` is the pull request.
    Published { url: String },
    /// The run ended deliberately without touching the remote.
    NoOpAborted { reason: String },
    Failed { reason: String },
}

impl WorkflowOutcome {
    pub fn no_op(reason: impl Into<String>) -> Self {
        WorkflowOutcome::NoOpAborted {
            reason: reason.into(),
        }
    }
}

impl From<AppError> for WorkflowOutcome {
    fn from(e: AppError) -> Self {
        WorkflowOutcome::Failed {
            reason: e.to_string(),
        }
    }
}
