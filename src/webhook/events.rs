use serde::Deserialize;

/// Top-level webhook event parsed from the payload based on X-GitHub-Event header.
#[derive(Debug)]
pub enum WebhookEvent {
    Issues(IssuesEvent),
    PullRequestReview(PullRequestReviewEvent),
    Ping,
    Unsupported(String),
}

#[derive(Debug, Deserialize)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: IssuePayload,
    /// The user just assigned; present on `assigned`/`unassigned`.
    pub assignee: Option<UserPayload>,
    pub repository: RepositoryPayload,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestReviewEvent {
    pub action: String,
    pub review: ReviewPayload,
    pub pull_request: PullRequestPayload,
    pub repository: RepositoryPayload,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub pull_request: Option<serde_json::Value>, // Present if issue is a PR
}

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    pub body: Option<String>,
    pub state: String, // "approved", "changes_requested", "commented"
    pub user: UserPayload,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    pub html_url: String,
    pub diff_url: String,
    pub head: PullRequestRef,
    pub user: UserPayload,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct InstallationPayload {
    pub id: u64,
}

impl WebhookEvent {
    pub fn parse(event_type: &str, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match event_type {
            "issues" => {
                let event: IssuesEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::Issues(event))
            }
            "pull_request_review" => {
                let event: PullRequestReviewEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::PullRequestReview(event))
            }
            "ping" => Ok(WebhookEvent::Ping),
            other => Ok(WebhookEvent::Unsupported(other.to_string())),
        }
    }
}
