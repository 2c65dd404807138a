//! Fixtures shared by the unit tests: local git remotes and in-memory
//! collaborators.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use git2::{BranchType, IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature};

use crate::agent::ModelClient;
use crate::config::AppConfig;
use crate::context::digest::CodeDigester;
use crate::context::Attachment;
use crate::error::{AppError, Result};
use crate::platform::types::{CreatePullRequest, PullRequest, RepoInfo};
use crate::platform::Platform;
use crate::queue::task::Task;
use crate::server::AppState;

pub const AGENT: &str = "tendril-bot";
pub const PR_URL: &str = "https://github.com/o/r/pull/1";

// --- Git fixtures ---

fn remote_path(root: &Path) -> std::path::PathBuf {
    root.join("remote.git")
}

fn seed_path(root: &Path) -> std::path::PathBuf {
    root.join("seed")
}

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (path, content) in files {
        let full = dir.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
    }
}

fn commit_index(repo: &Repository, message: &str) -> Oid {
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Seeder", "seed@example.com").unwrap();

    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

fn push_branch(repo: &Repository, branch: &str) {
    let mut remote = repo.find_remote("origin").unwrap();
    let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
    remote.push(&[&refspec], None).unwrap();
}

/// Create a bare remote with one commit on `main`; returns its `file://` URL.
pub fn seed_remote(root: &Path, files: &[(&str, &str)]) -> String {
    let mut bare_opts = RepositoryInitOptions::new();
    bare_opts.bare(true).initial_head("main");
    Repository::init_opts(remote_path(root), &bare_opts).unwrap();
    let url = format!("file://{}", remote_path(root).display());

    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let seed = Repository::init_opts(seed_path(root), &opts).unwrap();
    write_files(&seed_path(root), files);
    commit_index(&seed, "initial");

    seed.remote("origin", &url).unwrap();
    push_branch(&seed, "main");
    url
}

/// Commit `files` on `branch` (created from `main` if new) and force-push it.
pub fn commit_to_remote_branch(root: &Path, branch: &str, files: &[(&str, &str)]) -> Oid {
    let seed = Repository::open(seed_path(root)).unwrap();
    let base = match seed.find_branch(branch, BranchType::Local) {
        Ok(existing) => existing.get().peel_to_commit().unwrap(),
        Err(_) => seed
            .find_branch("main", BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap(),
    };

    seed.set_head_detached(base.id()).unwrap();
    seed.branch(branch, &base, true).unwrap();
    seed.set_head(&format!("refs/heads/{branch}")).unwrap();
    seed.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
        .unwrap();

    write_files(&seed_path(root), files);
    let oid = commit_index(&seed, &format!("update {branch}"));
    push_branch(&seed, branch);
    oid
}

pub fn remote_branch_tip(root: &Path, branch: &str) -> Option<Oid> {
    let remote = Repository::open_bare(remote_path(root)).ok()?;
    let reference = remote.find_reference(&format!("refs/heads/{branch}")).ok()?;
    reference.target()
}

/// Content of `path` at the tip of the remote `branch`.
pub fn remote_file(root: &Path, branch: &str, path: &str) -> Option<String> {
    let remote = Repository::open_bare(remote_path(root)).ok()?;
    let tree = remote
        .find_reference(&format!("refs/heads/{branch}"))
        .ok()?
        .peel_to_tree()
        .ok()?;
    let blob = tree
        .get_path(Path::new(path))
        .ok()?
        .to_object(&remote)
        .ok()?
        .peel_to_blob()
        .ok()?;
    Some(String::from_utf8_lossy(blob.content()).into_owned())
}

pub fn remote_commit_message(root: &Path, branch: &str) -> Option<String> {
    let remote = Repository::open_bare(remote_path(root)).ok()?;
    let commit = remote
        .find_reference(&format!("refs/heads/{branch}"))
        .ok()?
        .peel_to_commit()
        .ok()?;
    commit.message().map(str::to_string)
}

// --- Collaborator fakes ---

/// In-memory host API that records created pull requests.
pub struct FakePlatform {
    issue_html: std::result::Result<String, String>,
    pub created: Mutex<Vec<CreatePullRequest>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            issue_html: Ok(String::new()),
            created: Mutex::new(Vec::new()),
        }
    }
}

impl FakePlatform {
    pub fn with_issue_html(html: String) -> Self {
        Self {
            issue_html: Ok(html),
            ..Self::default()
        }
    }

    pub fn failing_issue_html() -> Self {
        Self {
            issue_html: Err("issue lookup failed".to_string()),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<CreatePullRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn get_access_token(&self, _installation_id: Option<u64>) -> Result<String> {
        Ok("test-token".to_string())
    }

    async fn get_repository(
        &self,
        _installation_id: Option<u64>,
        repo_full_name: &str,
    ) -> Result<RepoInfo> {
        Ok(RepoInfo {
            full_name: repo_full_name.to_string(),
            default_branch: "main".to_string(),
        })
    }

    async fn get_issue_html(
        &self,
        _installation_id: Option<u64>,
        _repo_full_name: &str,
        _issue_number: u64,
    ) -> Result<String> {
        self.issue_html.clone().map_err(AppError::GitHubApi)
    }

    async fn create_pull_request(
        &self,
        _installation_id: Option<u64>,
        _repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        self.created.lock().unwrap().push(pr.clone());
        Ok(PullRequest {
            number: 1,
            html_url: PR_URL.to_string(),
            head_branch: pr.head_branch.clone(),
        })
    }
}

/// Model that replays canned responses in order and records every prompt.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, prompt: &str, _attachments: &[Attachment]) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Model("no scripted response left".to_string())))
    }
}

pub struct StaticDigester(pub String);

#[async_trait]
impl CodeDigester for StaticDigester {
    async fn digest(&self, _repo_root: &Path) -> Result<String> {
        Ok(self.0.clone())
    }
}

// --- State builders ---

pub fn test_config(base_dir: &Path) -> AppConfig {
    serde_json::from_value(serde_json::json!({
        "github": { "agent_login": AGENT, "token": "ghp_test" },
        "model": { "api_key": "sk-test", "fast_model": null },
        "workspace": { "base_dir": base_dir.join("workspaces") },
        "formatters": {},
    }))
    .unwrap()
}

pub fn test_state(
    root: &Path,
    platform: Arc<FakePlatform>,
    model: Arc<ScriptedModel>,
    fast_model: Option<Arc<ScriptedModel>>,
) -> AppState {
    AppState::from_parts(
        test_config(root),
        reqwest::Client::new(),
        platform,
        model,
        fast_model.map(|m| m as Arc<dyn ModelClient>),
        Arc::new(StaticDigester("DIGEST".to_string())),
    )
}

pub fn review_task(repo: &str, pr_number: u64) -> Task {
    Task::RespondToReview {
        installation_id: None,
        repo_full_name: repo.to_string(),
        clone_url: "file:///nonexistent/remote.git".to_string(),
        default_branch: Some("main".to_string()),
        pr_number,
        pr_branch: "fix/thing".to_string(),
        pr_html_url: format!("https://github.com/{repo}/pull/{pr_number}"),
        diff_url: format!("https://github.com/{repo}/pull/{pr_number}.diff"),
        review_body: "Please handle the empty case".to_string(),
    }
}
