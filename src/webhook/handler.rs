use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::config::GitHubConfig;
use crate::queue::task::Task;
use crate::server::AppState;
use crate::webhook::events::{IssuesEvent, PullRequestReviewEvent, WebhookEvent};
use crate::webhook::signature::verify_delivery;

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());

    if let Err(e) = verify_delivery(state.config.webhook_secret(), &body, signature) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    let Some(task) = triage(&state.config.github, event) else {
        return StatusCode::OK;
    };

    let mut queue = state.task_queue.write().await;
    if queue.enqueue(task) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Decide whether an event is work for the agent.
///
/// Pure: no I/O, so dropped events never touch a repository.
pub fn triage(github: &GitHubConfig, event: WebhookEvent) -> Option<Task> {
    match event {
        WebhookEvent::Issues(event) => triage_issue(github, event),
        WebhookEvent::PullRequestReview(event) => triage_review(github, event),
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            None
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            None
        }
    }
}

fn triage_issue(github: &GitHubConfig, event: IssuesEvent) -> Option<Task> {
    if event.action != "assigned" {
        return None;
    }

    let assignee = event.assignee?.login;
    if !github.is_agent(&assignee) {
        tracing::debug!(
            repo = %event.repository.full_name,
            issue = event.issue.number,
            assignee = %assignee,
            "Issue assigned to someone else"
        );
        return None;
    }

    // Don't process pull requests via the issues event
    if event.issue.pull_request.is_some() {
        return None;
    }

    tracing::info!(
        repo = %event.repository.full_name,
        issue = event.issue.number,
        "Issue assigned to agent, enqueuing task"
    );

    Some(Task::ResolveIssue {
        installation_id: event.installation.map(|i| i.id),
        repo_full_name: event.repository.full_name,
        clone_url: event.repository.clone_url,
        default_branch: event.repository.default_branch,
        issue_number: event.issue.number,
        issue_title: event.issue.title,
        issue_body: event.issue.body.unwrap_or_default(),
        assignee,
    })
}

fn triage_review(github: &GitHubConfig, event: PullRequestReviewEvent) -> Option<Task> {
    if event.action != "submitted" || event.review.state != "changes_requested" {
        return None;
    }

    if !github.is_agent(&event.review.user.login) {
        tracing::debug!(
            repo = %event.repository.full_name,
            pr = event.pull_request.number,
            reviewer = %event.review.user.login,
            "Ignoring review not authored by the agent"
        );
        return None;
    }

    tracing::info!(
        repo = %event.repository.full_name,
        pr = event.pull_request.number,
        pr_author = %event.pull_request.user.login,
        "Changes requested on PR, enqueuing review response task"
    );

    Some(Task::RespondToReview {
        installation_id: event.installation.map(|i| i.id),
        repo_full_name: event.repository.full_name,
        clone_url: event.repository.clone_url,
        default_branch: event.repository.default_branch,
        pr_number: event.pull_request.number,
        pr_branch: event.pull_request.head.ref_name,
        pr_html_url: event.pull_request.html_url,
        diff_url: event.pull_request.diff_url,
        review_body: event.review.body.unwrap_or_default(),
    })
}
