use std::path::Path;

use crate::agent::protocol::{self, PrMetadata};
use crate::agent::{prompt, ModelClient};
use crate::context::{attachments, template, CodeContext};
use crate::error::Result;
use crate::patch;
use crate::platform::types::CreatePullRequest;
use crate::server::AppState;
use crate::workflow::types::WorkflowOutcome;
use crate::workspace::{git, WorkspaceLease};

const ATTRIBUTION: &str = "*This pull request was generated automatically by tendril.*";

/// An issue assigned to the agent.
#[derive(Debug, Clone, Copy)]
pub struct IssueAssignment<'a> {
    pub installation_id: Option<u64>,
    pub repo_full_name: &'a str,
    pub clone_url: &'a str,
    pub default_branch: Option<&'a str>,
    pub issue_number: u64,
    pub issue_title: &'a str,
    pub issue_body: &'a str,
    pub assignee: &'a str,
}

/// Turn an assigned issue into a pull request.
pub async fn resolve_issue(state: &AppState, issue: &IssueAssignment<'_>) -> WorkflowOutcome {
    if !state.config.github.is_agent(issue.assignee) {
        return WorkflowOutcome::no_op(format!(
            "issue #{} is assigned to {}, not {}",
            issue.issue_number, issue.assignee, state.config.github.agent_login
        ));
    }

    let lease = state.workspaces.acquire(issue.repo_full_name).await;
    run(state, &lease, issue).await.unwrap_or_else(Into::into)
}

async fn run(
    state: &AppState,
    lease: &WorkspaceLease,
    issue: &IssueAssignment<'_>,
) -> Result<WorkflowOutcome> {
    let platform = state.platform.as_ref();
    let root = lease.path();

    let token = platform.get_access_token(issue.installation_id).await?;
    let base_branch = super::resolve_default_branch(
        state,
        issue.installation_id,
        issue.repo_full_name,
        issue.default_branch,
    )
    .await?;
    lease
        .ensure_updated(issue.clone_url, &base_branch, &token)
        .await?;

    let context = CodeContext {
        digest: state.digester.digest(root).await?,
        attachments: attachments::fetch_issue_attachments(
            platform,
            &state.http,
            issue.installation_id,
            issue.repo_full_name,
            issue.issue_number,
        )
        .await,
    };
    let pr_template = template::fetch_pr_template(root).await;

    let code_prompt = prompt::issue_prompt(
        issue.issue_number,
        issue.issue_title,
        issue.issue_body,
        &context.digest,
    );
    tracing::info!(
        issue = issue.issue_number,
        attachments = context.attachments.len(),
        "Requesting code changes"
    );
    let response = state
        .model
        .generate(&code_prompt, &context.attachments)
        .await?;

    let edits = protocol::parse_file_edits(&response);
    if edits.is_empty() {
        return Ok(WorkflowOutcome::no_op("model proposed no file changes"));
    }
    let written = patch::apply(root, &edits).await?;
    patch::format_changed(root, &written, &state.config.formatters).await?;

    if !git::has_changes(root).await? {
        return Ok(WorkflowOutcome::no_op("edits left the working tree unchanged"));
    }

    let diff = git::diff_head(root).await?;
    let metadata = derive_metadata(
        state.model.as_ref(),
        root,
        issue,
        &base_branch,
        &diff,
        pr_template.as_deref(),
    )
    .await;

    git::create_or_replace_branch(
        root,
        &metadata.branch_name,
        &format!("refs/remotes/origin/{base_branch}"),
    )
    .await?;
    git::commit_all(
        root,
        &metadata.commit_message,
        &state.config.workspace.commit_author_name,
        &state.config.workspace.commit_author_email,
    )
    .await?;
    git::force_push(root, &metadata.branch_name, &token).await?;
    tracing::info!(branch = %metadata.branch_name, "Pushed branch");

    let pr = platform
        .create_pull_request(
            issue.installation_id,
            issue.repo_full_name,
            &CreatePullRequest {
                title: metadata.pr_title,
                body: pr_body(issue.issue_number, &metadata.pr_description),
                head_branch: metadata.branch_name,
                base_branch,
            },
        )
        .await?;

    tracing::info!(pr = pr.number, url = %pr.html_url, "Opened pull request");
    Ok(WorkflowOutcome::Published { url: pr.html_url })
}

/// Ask the model for branch/PR metadata, falling back wholesale on any failure.
///
/// The branch is force-pushed, so a model-chosen name is only kept when origin
/// has no branch of that name yet. The fallback branch is the agent's own and
/// may be overwritten.
async fn derive_metadata(
    model: &dyn ModelClient,
    root: &Path,
    issue: &IssueAssignment<'_>,
    base_branch: &str,
    diff: &str,
    pr_template: Option<&str>,
) -> PrMetadata {
    let fallback = PrMetadata::fallback(issue.issue_number, issue.issue_title);
    let request = prompt::metadata_prompt(issue.issue_number, issue.issue_title, diff, pr_template);
    let parsed = match model.generate(&request, &[]).await {
        Ok(response) => protocol::parse_pr_metadata(&response),
        Err(e) => Err(e),
    };

    let metadata = match parsed {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!(issue = issue.issue_number, error = %e, "Using fallback PR metadata");
            return fallback;
        }
    };

    if metadata.branch_name == fallback.branch_name {
        return metadata;
    }
    if metadata.branch_name == base_branch {
        tracing::warn!(
            branch = %metadata.branch_name,
            "Model picked the default branch; using fallback metadata"
        );
        return fallback;
    }
    match git::remote_branch_exists(root, &metadata.branch_name).await {
        Ok(false) => metadata,
        Ok(true) => {
            tracing::warn!(
                branch = %metadata.branch_name,
                "Model picked a branch that already exists on origin; using fallback metadata"
            );
            fallback
        }
        Err(e) => {
            tracing::warn!(
                branch = %metadata.branch_name,
                error = %e,
                "Could not check remote branches; using fallback metadata"
            );
            fallback
        }
    }
}

fn pr_body(issue_number: u64, description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("Closes #{issue_number}\n\n---\n{ATTRIBUTION}")
    } else {
        format!("Closes #{issue_number}\n\n{description}\n\n---\n{ATTRIBUTION}")
    }
}
