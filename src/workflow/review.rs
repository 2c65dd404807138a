use crate::agent::protocol;
use crate::agent::{prompt, ModelClient};
use crate::error::{AppError, Result};
use crate::patch;
use crate::server::AppState;
use crate::workflow::types::WorkflowOutcome;
use crate::workspace::{git, WorkspaceLease};

pub const FALLBACK_COMMIT_MESSAGE: &str = "Address PR review feedback";

/// A "changes requested" review on one of the agent's pull requests.
#[derive(Debug, Clone, Copy)]
pub struct ReviewFeedback<'a> {
    pub installation_id: Option<u64>,
    pub repo_full_name: &'a str,
    pub clone_url: &'a str,
    pub default_branch: Option<&'a str>,
    pub pr_number: u64,
    pub pr_branch: &'a str,
    pub pr_html_url: &'a str,
    pub diff_url: &'a str,
    pub review_body: &'a str,
}

/// Revise the pull request branch in place to address the review.
pub async fn respond_to_review(state: &AppState, review: &ReviewFeedback<'_>) -> WorkflowOutcome {
    let lease = state.workspaces.acquire(review.repo_full_name).await;
    run(state, &lease, review).await.unwrap_or_else(Into::into)
}

async fn run(
    state: &AppState,
    lease: &WorkspaceLease,
    review: &ReviewFeedback<'_>,
) -> Result<WorkflowOutcome> {
    let root = lease.path();
    let token = state
        .platform
        .get_access_token(review.installation_id)
        .await?;
    let base_branch = super::resolve_default_branch(
        state,
        review.installation_id,
        review.repo_full_name,
        review.default_branch,
    )
    .await?;

    lease
        .ensure_updated(review.clone_url, &base_branch, &token)
        .await?;
    git::sync_to_remote_branch(root, review.pr_branch, &token).await?;

    let pr_diff = fetch_pr_diff(&state.http, review.diff_url).await?;
    let digest = state.digester.digest(root).await?;

    tracing::info!(pr = review.pr_number, branch = review.pr_branch, "Requesting revision");
    let request = prompt::review_prompt(review.review_body, &pr_diff, &digest);
    let response = state.model.generate(&request, &[]).await?;

    let edits = protocol::parse_file_edits(&response);
    if edits.is_empty() {
        return Ok(WorkflowOutcome::no_op("model proposed no revisions"));
    }
    let written = patch::apply(root, &edits).await?;
    patch::format_changed(root, &written, &state.config.formatters).await?;

    if !git::has_changes(root).await? {
        return Ok(WorkflowOutcome::no_op("revisions left the working tree unchanged"));
    }

    let diff = git::diff_head(root).await?;
    let message = commit_message(state.fast_model.as_deref(), &diff).await;

    git::commit_all(
        root,
        &message,
        &state.config.workspace.commit_author_name,
        &state.config.workspace.commit_author_email,
    )
    .await?;
    git::force_push(root, review.pr_branch, &token).await?;

    tracing::info!(pr = review.pr_number, branch = review.pr_branch, "Pushed review revision");
    Ok(WorkflowOutcome::Published {
        url: review.pr_html_url.to_string(),
    })
}

/// Plain GET of the PR's `.diff` URL.
async fn fetch_pr_diff(client: &reqwest::Client, diff_url: &str) -> Result<String> {
    let response = client.get(diff_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::GitHubApi(format!(
            "Fetching PR diff {diff_url} returned {status}"
        )));
    }
    Ok(response.text().await?)
}

/// Commit message from the secondary model, or the fixed literal.
async fn commit_message(fast_model: Option<&dyn ModelClient>, diff: &str) -> String {
    let Some(model) = fast_model else {
        return FALLBACK_COMMIT_MESSAGE.to_string();
    };

    match model.generate(&prompt::commit_message_prompt(diff), &[]).await {
        Ok(response) => protocol::clean_commit_message(&response).unwrap_or_else(|| {
            tracing::warn!("Commit message model returned nothing usable");
            FALLBACK_COMMIT_MESSAGE.to_string()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Commit message model unavailable");
            FALLBACK_COMMIT_MESSAGE.to_string()
        }
    }
}
