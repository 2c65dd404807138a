/// Work accepted from a webhook delivery, consumed by exactly one workflow run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    ResolveIssue {
        installation_id: Option<u64>,
        repo_full_name: String,
        clone_url: String,
        /// From the payload when present; otherwise looked up on the host.
        default_branch: Option<String>,
        issue_number: u64,
        issue_title: String,
        issue_body: String,
        assignee: String,
    },
    RespondToReview {
        installation_id: Option<u64>,
        repo_full_name: String,
        clone_url: String,
        default_branch: Option<String>,
        pr_number: u64,
        pr_branch: String,
        pr_html_url: String,
        diff_url: String,
        review_body: String,
    },
}

impl Task {
    pub fn repo_full_name(&self) -> &str {
        match self {
            Task::ResolveIssue { repo_full_name, .. } => repo_full_name,
            Task::RespondToReview { repo_full_name, .. } => repo_full_name,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Task::ResolveIssue {
                repo_full_name,
                issue_number,
                ..
            } => format!("Resolve issue #{issue_number} on {repo_full_name}"),
            Task::RespondToReview {
                repo_full_name,
                pr_number,
                ..
            } => format!("Respond to review on PR #{pr_number} on {repo_full_name}"),
        }
    }
}
