use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    /// File extension (without the dot) -> formatter argv. The changed files are
    /// appended to the argv.
    #[serde(default = "default_formatters")]
    pub formatters: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// Login events must be addressed to (issue assignee, review author).
    pub agent_login: String,
    /// Personal access token. Mutually exclusive with the App credentials.
    pub token: Option<String>,
    pub app_id: Option<u64>,
    pub private_key_path: Option<PathBuf>,
    pub webhook_secret: Option<String>,
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

/// How the service authenticates against GitHub.
#[derive(Clone)]
pub enum GitHubAuth {
    PersonalToken(String),
    App {
        app_id: u64,
        private_key_path: PathBuf,
    },
}

impl GitHubConfig {
    pub fn auth(&self) -> Result<GitHubAuth> {
        match (&self.token, self.app_id, &self.private_key_path) {
            (Some(token), None, None) => Ok(GitHubAuth::PersonalToken(token.clone())),
            (None, Some(app_id), Some(path)) => Ok(GitHubAuth::App {
                app_id,
                private_key_path: path.clone(),
            }),
            (None, _, _) => Err(AppError::Config(
                "github: set either `token` or both `app_id` and `private_key_path`".to_string(),
            )),
            (Some(_), _, _) => Err(AppError::Config(
                "github: `token` cannot be combined with App credentials".to_string(),
            )),
        }
    }

    pub fn is_agent(&self, login: &str) -> bool {
        self.agent_login.eq_ignore_ascii_case(login)
    }
}

// Manual Debug impl to avoid leaking the token and webhook secret
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("agent_login", &self.agent_login)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("app_id", &self.app_id)
            .field("private_key_path", &self.private_key_path)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Deserialize, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    #[serde(default = "default_model_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Cheaper model for commit messages. `None` disables the call entirely.
    #[serde(default = "default_fast_model")]
    pub fast_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Whole-request timeout for one model call.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("fast_model", &self.fast_model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_author_name")]
    pub commit_author_name: String,
    #[serde(default = "default_author_email")]
    pub commit_author_email: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
            commit_author_name: default_author_name(),
            commit_author_email: default_author_email(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default = "default_digest_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Subtree of the repository the digester runs in.
    #[serde(default = "default_digest_source_dir")]
    pub source_dir: PathBuf,
    /// File the digester writes, relative to `source_dir`.
    #[serde(default = "default_digest_output")]
    pub output_file: PathBuf,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            command: default_digest_command(),
            args: Vec::new(),
            source_dir: default_digest_source_dir(),
            output_file: default_digest_output(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_model_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_fast_model() -> Option<String> {
    Some("claude-3-5-haiku-20241022".to_string())
}

fn default_max_tokens() -> u32 {
    16384
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/tendril-workspaces")
}

fn default_author_name() -> String {
    "Tendril Bot".to_string()
}

fn default_author_email() -> String {
    "tendril[bot]@users.noreply.github.com".to_string()
}

fn default_digest_command() -> String {
    "gitingest".to_string()
}

fn default_digest_source_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_digest_output() -> PathBuf {
    PathBuf::from("digest.txt")
}

fn default_formatters() -> HashMap<String, Vec<String>> {
    HashMap::from([(
        "dart".to_string(),
        vec!["dart".to_string(), "format".to_string()],
    )])
}

fn default_http_timeout() -> u64 {
    30
}

fn default_model_timeout() -> u64 {
    600
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("tendril").required(false));
        }

        // Environment variable overrides with TENDRIL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("TENDRIL")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        // Fail at startup rather than on the first event.
        config.github.auth()?;

        Ok(config)
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.github.webhook_secret.as_deref()
    }

    pub fn model_api_key(&self) -> &str {
        &self.model.api_key
    }
}
