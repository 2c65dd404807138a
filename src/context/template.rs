use std::path::Path;

/// Conventional pull request template locations, in lookup order.
const TEMPLATE_CANDIDATES: &[&str] = &[
    "PULL_REQUEST_TEMPLATE.md",
    "pull_request_template.md",
    ".github/PULL_REQUEST_TEMPLATE.md",
    ".github/pull_request_template.md",
    "docs/PULL_REQUEST_TEMPLATE.md",
    "docs/pull_request_template.md",
];

/// Contents of the first pull request template found in the working copy.
pub async fn fetch_pr_template(repo_root: &Path) -> Option<String> {
    for candidate in TEMPLATE_CANDIDATES {
        let path = repo_root.join(candidate);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) if !content.trim().is_empty() => {
                tracing::debug!(path = candidate, "Using pull request template");
                return Some(content);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = candidate, error = %e, "Could not read PR template"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_absent_template_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(fetch_pr_template(tmp.path()).await, None);
    }

    #[tokio::test]
    async fn test_github_dir_template_is_found() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join(".github")).unwrap();
        fs::write(
            tmp.path().join(".github/pull_request_template.md"),
            "## Summary\n",
        )
        .unwrap();

        assert_eq!(
            fetch_pr_template(tmp.path()).await.as_deref(),
            Some("## Summary\n")
        );
    }

    #[tokio::test]
    async fn test_root_template_wins_over_docs() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("docs")).unwrap();
        fs::write(tmp.path().join("docs/PULL_REQUEST_TEMPLATE.md"), "docs").unwrap();
        fs::write(tmp.path().join("PULL_REQUEST_TEMPLATE.md"), "root").unwrap();

        assert_eq!(fetch_pr_template(tmp.path()).await.as_deref(), Some("root"));
    }
}
