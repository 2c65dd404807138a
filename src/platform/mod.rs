pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// Host API operations the workflows depend on.
///
/// `installation_id` is the GitHub App installation an event came from; it is
/// `None` when the service runs with a personal access token.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Token used for git transport and API calls.
    async fn get_access_token(&self, installation_id: Option<u64>) -> Result<String>;

    async fn get_repository(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
    ) -> Result<RepoInfo>;

    /// Issue body rendered to HTML (used to discover image attachments).
    async fn get_issue_html(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
        issue_number: u64,
    ) -> Result<String>;

    async fn create_pull_request(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest>;
}
