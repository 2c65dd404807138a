use std::sync::Arc;

use axum::{routing::post, Router};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::agent::claude::ClaudeClient;
use crate::agent::ModelClient;
use crate::config::{AppConfig, HttpConfig};
use crate::context::digest::{CodeDigester, CommandDigester};
use crate::error::Result;
use crate::platform::github::GitHubPlatform;
use crate::platform::Platform;
use crate::queue::TaskQueue;
use crate::workspace::WorkspaceManager;

/// Process-wide collaborators, built once at startup and shared by reference.
pub struct AppState {
    pub config: AppConfig,
    pub platform: Arc<dyn Platform>,
    pub model: Arc<dyn ModelClient>,
    /// Secondary model for commit messages; `None` uses the literal fallback.
    pub fast_model: Option<Arc<dyn ModelClient>>,
    pub digester: Arc<dyn CodeDigester>,
    pub workspaces: WorkspaceManager,
    /// Plain HTTP client for attachments and PR diffs.
    pub http: reqwest::Client,
    pub task_queue: RwLock<TaskQueue>,
}

pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(concat!("tendril/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = http_client(&config.http)?;
        let platform = GitHubPlatform::new(&config.github, http.clone())?;
        let model = ClaudeClient::new(&config.model, &config.model.model)?;
        let fast_model = match config.model.fast_model.as_deref() {
            Some(name) => Some(Arc::new(ClaudeClient::new(&config.model, name)?) as Arc<dyn ModelClient>),
            None => None,
        };
        let digester = CommandDigester::new(config.digest.clone());

        tracing::info!(
            model = model.model(),
            fast_model = ?config.model.fast_model,
            workspace = %config.workspace.base_dir.display(),
            "Collaborators ready"
        );

        Ok(Self::from_parts(
            config,
            http,
            Arc::new(platform),
            Arc::new(model),
            fast_model,
            Arc::new(digester),
        ))
    }

    pub fn from_parts(
        config: AppConfig,
        http: reqwest::Client,
        platform: Arc<dyn Platform>,
        model: Arc<dyn ModelClient>,
        fast_model: Option<Arc<dyn ModelClient>>,
        digester: Arc<dyn CodeDigester>,
    ) -> Self {
        let workspaces = WorkspaceManager::new(&config.workspace);
        Self {
            config,
            platform,
            model,
            fast_model,
            digester,
            workspaces,
            http,
            task_queue: RwLock::new(TaskQueue::new()),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/github", post(crate::webhook::handler::handle_webhook))
        .route("/health", axum::routing::get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
