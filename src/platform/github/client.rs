use async_trait::async_trait;
use octocrab::Octocrab;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{GitHubAuth, GitHubConfig};
use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::Platform;

use super::auth::AppCredentials;
use super::mapper;

const USER_AGENT: &str = concat!("tendril/", env!("CARGO_PKG_VERSION"));
const HTML_MEDIA_TYPE: &str = "application/vnd.github.html+json";

enum Credentials {
    Token(String),
    App(AppCredentials),
}

pub struct GitHubPlatform {
    api_url: String,
    credentials: Credentials,
    http: reqwest::Client,
    /// Cache of installation tokens: installation_id -> (token, expiry)
    token_cache: Arc<RwLock<HashMap<u64, (String, chrono::DateTime<chrono::Utc>)>>>,
}

#[derive(Deserialize)]
struct IssueHtml {
    body_html: Option<String>,
}

impl GitHubPlatform {
    pub fn new(config: &GitHubConfig, http: reqwest::Client) -> Result<Self> {
        let credentials = match config.auth()? {
            GitHubAuth::PersonalToken(token) => Credentials::Token(token),
            GitHubAuth::App {
                app_id,
                private_key_path,
            } => Credentials::App(AppCredentials::load(app_id, &private_key_path)?),
        };

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            http,
            token_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn octocrab_with_token(&self, token: String) -> Result<Octocrab> {
        Octocrab::builder()
            .base_uri(self.api_url.as_str())
            .map_err(|e| AppError::Config(format!("Invalid GitHub API URL: {e}")))?
            .personal_token(token)
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))
    }

    /// Get an octocrab instance authenticated for the event's installation.
    async fn api_client(&self, installation_id: Option<u64>) -> Result<Octocrab> {
        let token = self.get_access_token(installation_id).await?;
        self.octocrab_with_token(token)
    }

    async fn installation_token(&self, app: &AppCredentials, installation_id: u64) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expiry)) = cache.get(&installation_id) {
                if *expiry > chrono::Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        let client = self.octocrab_with_token(app.jwt()?)?;
        let url = format!("/app/installations/{installation_id}/access_tokens");
        let response: serde_json::Value = client
            .post(&url, None::<&()>)
            .await
            .map_err(|e| AppError::GitHubApi(format!("Failed to create installation token: {e}")))?;

        let token = response["token"]
            .as_str()
            .ok_or_else(|| AppError::GitHubApi("No token in response".to_string()))?
            .to_string();

        let expires_at = response["expires_at"]
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::hours(1));

        tracing::debug!(installation_id, %expires_at, "Minted installation token");
        let mut cache = self.token_cache.write().await;
        cache.insert(installation_id, (token.clone(), expires_at));

        Ok(token)
    }

    fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
        match repo_full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
            _ => Err(AppError::GitHubApi(format!(
                "Invalid repo name: {repo_full_name}"
            ))),
        }
    }
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn get_access_token(&self, installation_id: Option<u64>) -> Result<String> {
        match (&self.credentials, installation_id) {
            (Credentials::Token(token), _) => Ok(token.clone()),
            (Credentials::App(app), Some(id)) => self.installation_token(app, id).await,
            (Credentials::App(_), None) => Err(AppError::GitHubApi(
                "event carries no installation id; cannot authenticate as the App".to_string(),
            )),
        }
    }

    async fn get_repository(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
    ) -> Result<RepoInfo> {
        let client = self.api_client(installation_id).await?;
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        let repository = client.repos(owner, repo).get().await?;
        Ok(mapper::map_repository(repository, repo_full_name))
    }

    async fn get_issue_html(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
        issue_number: u64,
    ) -> Result<String> {
        let token = self.get_access_token(installation_id).await?;
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        let url = format!("{}/repos/{owner}/{repo}/issues/{issue_number}", self.api_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, HTML_MEDIA_TYPE)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GitHubApi(format!(
                "Fetching issue #{issue_number} returned {status}: {body}"
            )));
        }

        let issue: IssueHtml = response.json().await?;
        Ok(issue.body_html.unwrap_or_default())
    }

    async fn create_pull_request(
        &self,
        installation_id: Option<u64>,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        let client = self.api_client(installation_id).await?;
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        let created = client
            .pulls(owner, repo)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .send()
            .await?;

        Ok(mapper::map_pull_request(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn token_platform(api_url: &str) -> GitHubPlatform {
        let config: GitHubConfig = serde_json::from_value(json!({
            "agent_login": "tendril-bot",
            "token": "ghp_test",
            "api_url": api_url,
        }))
        .unwrap();
        GitHubPlatform::new(&config, reqwest::Client::new()).unwrap()
    }

    #[test]
    fn test_parse_repo() {
        assert_eq!(GitHubPlatform::parse_repo("o/r").unwrap(), ("o", "r"));
        assert!(GitHubPlatform::parse_repo("no-slash").is_err());
        assert!(GitHubPlatform::parse_repo("/r").is_err());
    }

    #[tokio::test]
    async fn test_personal_token_ignores_installation() {
        let platform = token_platform("https://api.github.com");
        assert_eq!(platform.get_access_token(None).await.unwrap(), "ghp_test");
        assert_eq!(platform.get_access_token(Some(9)).await.unwrap(), "ghp_test");
    }

    #[tokio::test]
    async fn test_issue_html_uses_html_media_type() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/repos/o/r/issues/42")
                    .header("authorization", "Bearer ghp_test")
                    .header("accept", HTML_MEDIA_TYPE);
                then.status(200).json_body(json!({
                    "number": 42,
                    "body_html": "<p><img src=\"https://x/a.png\"></p>"
                }));
            })
            .await;

        let platform = token_platform(&server.base_url());
        let html = platform.get_issue_html(None, "o/r", 42).await.unwrap();

        mock.assert_async().await;
        assert!(html.contains("https://x/a.png"));
    }

    #[tokio::test]
    async fn test_issue_html_error_status_is_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/o/r/issues/7");
                then.status(404).body("Not Found");
            })
            .await;

        let platform = token_platform(&server.base_url());
        let err = platform.get_issue_html(None, "o/r", 7).await.unwrap_err();
        assert!(matches!(err, AppError::GitHubApi(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn test_empty_issue_body_renders_as_empty_html() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/o/r/issues/1");
                then.status(200).json_body(json!({ "number": 1, "body_html": null }));
            })
            .await;

        let platform = token_platform(&server.base_url());
        assert_eq!(platform.get_issue_html(None, "o/r", 1).await.unwrap(), "");
    }
}
