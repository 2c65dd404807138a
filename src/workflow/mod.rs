pub mod issue;
pub mod review;
pub mod types;

pub use types::WorkflowOutcome;

use crate::queue::task::Task;
use crate::server::AppState;

/// Run the workflow a task calls for. Errors are folded into the outcome.
pub async fn execute(state: &AppState, task: &Task) -> WorkflowOutcome {
    match task {
        Task::ResolveIssue {
            installation_id,
            repo_full_name,
            clone_url,
            default_branch,
            issue_number,
            issue_title,
            issue_body,
            assignee,
        } => {
            issue::resolve_issue(
                state,
                &issue::IssueAssignment {
                    installation_id: *installation_id,
                    repo_full_name,
                    clone_url,
                    default_branch: default_branch.as_deref(),
                    issue_number: *issue_number,
                    issue_title,
                    issue_body,
                    assignee,
                },
            )
            .await
        }
        Task::RespondToReview {
            installation_id,
            repo_full_name,
            clone_url,
            default_branch,
            pr_number,
            pr_branch,
            pr_html_url,
            diff_url,
            review_body,
        } => {
            review::respond_to_review(
                state,
                &review::ReviewFeedback {
                    installation_id: *installation_id,
                    repo_full_name,
                    clone_url,
                    default_branch: default_branch.as_deref(),
                    pr_number: *pr_number,
                    pr_branch,
                    pr_html_url,
                    diff_url,
                    review_body,
                },
            )
            .await
        }
    }
}

/// The repository's default branch: from the event when it carried one,
/// otherwise from the host.
pub(crate) async fn resolve_default_branch(
    state: &AppState,
    installation_id: Option<u64>,
    repo_full_name: &str,
    from_event: Option<&str>,
) -> crate::error::Result<String> {
    match from_event {
        Some(branch) if !branch.is_empty() => Ok(branch.to_string()),
        _ => Ok(state
            .platform
            .get_repository(installation_id, repo_full_name)
            .await?
            .default_branch),
    }
}
