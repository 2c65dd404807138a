use crate::platform::types;

pub fn map_repository(repo: octocrab::models::Repository, requested: &str) -> types::RepoInfo {
    types::RepoInfo {
        full_name: repo.full_name.unwrap_or_else(|| requested.to_string()),
        default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
    }
}

pub fn map_pull_request(pr: octocrab::models::pulls::PullRequest) -> types::PullRequest {
    types::PullRequest {
        number: pr.number,
        html_url: pr
            .html_url
            .map(|url| url.to_string())
            .unwrap_or_default(),
        head_branch: pr.head.ref_field,
    }
}
