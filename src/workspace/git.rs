use std::path::Path;

use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    BranchType, Cred, DiffFormat, DiffOptions, FetchOptions, IndexAddOption, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature, StatusOptions,
};

use crate::error::{AppError, Result};

/// Validate a branch name to prevent argument injection and malformed refs.
fn validate_branch_name(name: &str) -> Result<()> {
    if name.starts_with('-') {
        return Err(AppError::Git(format!(
            "Invalid branch name (starts with '-'): {name}"
        )));
    }
    if !is_valid_branch_name(name) {
        return Err(AppError::Git(format!("Invalid branch name: {name}")));
    }
    Ok(())
}

/// Whether `name` can be used as `refs/heads/<name>`.
pub fn is_valid_branch_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && git2::Reference::is_valid_name(&format!("refs/heads/{name}"))
}

fn validate_remote_url(url: &str) -> Result<()> {
    if url.starts_with("https://") || url.starts_with("file://") {
        Ok(())
    } else {
        Err(AppError::Git(format!(
            "Expected HTTPS clone URL, got: {url}"
        )))
    }
}

/// Callbacks that authenticate with the short-lived token.
/// The token is captured by the closure and never written to disk.
fn make_callbacks(token: &str) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, _username_from_url, _allowed_types| {
        Cred::userpass_plaintext("x-access-token", token)
    });
    callbacks
}

fn make_fetch_options(token: &str) -> FetchOptions<'_> {
    let mut opts = FetchOptions::new();
    opts.remote_callbacks(make_callbacks(token));
    opts
}

/// Build `PushOptions` that authenticate via callback and turn a rejected
/// ref update into an error (libgit2 reports those out of band).
fn make_push_options(token: &str) -> PushOptions<'_> {
    let mut callbacks = make_callbacks(token);
    callbacks.push_update_reference(|refname, status| match status {
        Some(message) => Err(git2::Error::from_str(&format!(
            "remote rejected {refname}: {message}"
        ))),
        None => Ok(()),
    });
    let mut opts = PushOptions::new();
    opts.remote_callbacks(callbacks);
    opts
}

/// Point `branch_name` at `origin/<branch_name>` and hard-reset the tree to it,
/// dropping local commits, modifications and untracked files.
fn hard_reset_to_remote(repo: &Repository, branch_name: &str) -> Result<()> {
    let remote_ref = format!("refs/remotes/origin/{branch_name}");
    let commit = repo
        .find_reference(&remote_ref)
        .map_err(|e| AppError::Git(format!("{remote_ref} not found: {}", e.message())))?
        .peel_to_commit()?;

    // libgit2 refuses to force-move the branch HEAD points at.
    repo.set_head_detached(commit.id())?;
    repo.branch(branch_name, &commit, true)?;
    repo.set_head(&format!("refs/heads/{branch_name}"))?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;
    Ok(())
}

/// Clone a repository into the target directory.
///
/// The remote URL stored in `.git/config` will be the **plain** URL
/// (no credentials). Authentication is handled via credential callback only.
pub async fn clone(url: &str, target: &Path, token: &str) -> Result<()> {
    validate_remote_url(url)?;

    let url = url.to_string();
    let target = target.to_path_buf();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let fetch_opts = make_fetch_options(&token);
        RepoBuilder::new()
            .fetch_options(fetch_opts)
            .clone(&url, &target)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Clone task panicked: {e}")))?
}

/// Fetch everything from origin and reset `default_branch` to the remote tip.
///
/// `origin` is re-pointed at `url` first, so a working copy survives a repository
/// rename.
pub async fn update_default_branch(
    dir: &Path,
    url: &str,
    default_branch: &str,
    token: &str,
) -> Result<()> {
    validate_remote_url(url)?;
    validate_branch_name(default_branch)?;

    let dir = dir.to_path_buf();
    let url = url.to_string();
    let default_branch = default_branch.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        repo.remote_set_url("origin", &url)?;

        let mut remote = repo.find_remote("origin")?;
        let mut fetch_opts = make_fetch_options(&token);
        remote.fetch(
            &["+refs/heads/*:refs/remotes/origin/*"],
            Some(&mut fetch_opts),
            None,
        )?;

        hard_reset_to_remote(&repo, &default_branch)
    })
    .await
    .map_err(|e| AppError::Git(format!("Update task panicked: {e}")))?
}

/// Fetch a remote branch, check it out and hard-reset it to the remote tip.
pub async fn sync_to_remote_branch(dir: &Path, branch_name: &str, token: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;

        let refspec = format!("+refs/heads/{branch_name}:refs/remotes/origin/{branch_name}");
        let mut fetch_opts = make_fetch_options(&token);
        remote.fetch(&[&refspec], Some(&mut fetch_opts), None)?;

        hard_reset_to_remote(&repo, &branch_name)
    })
    .await
    .map_err(|e| AppError::Git(format!("Sync task panicked: {e}")))?
}

/// Create `branch_name` at `base_ref` and make it HEAD, deleting any existing
/// local branch of that name first.
///
/// Only HEAD moves: the index and working tree are left alone, so edits applied
/// on top of `base_ref` carry over onto the new branch.
pub async fn create_or_replace_branch(dir: &Path, branch_name: &str, base_ref: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let base_ref = base_ref.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let base = repo.revparse_single(&base_ref)?.peel_to_commit()?;

        repo.set_head_detached(base.id())?;
        if let Ok(mut existing) = repo.find_branch(&branch_name, BranchType::Local) {
            tracing::info!(branch = %branch_name, "Deleting stale local branch");
            existing.delete()?;
        }

        repo.branch(&branch_name, &base, false)?;
        repo.set_head(&format!("refs/heads/{branch_name}"))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Create-branch task panicked: {e}")))?
}

/// Stage every change (additions, modifications, deletions) and commit on HEAD.
///
/// Returns `AppError::NothingToCommit` when the staged tree equals HEAD's tree.
pub async fn commit_all(
    dir: &Path,
    message: &str,
    author_name: &str,
    author_email: &str,
) -> Result<git2::Oid> {
    let dir = dir.to_path_buf();
    let message = message.to_string();
    let author_name = author_name.to_string();
    let author_email = author_email.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_oid = index.write_tree()?;
        let parent = repo.head()?.peel_to_commit()?;
        if parent.tree_id() == tree_oid {
            return Err(AppError::NothingToCommit);
        }

        let tree = repo.find_tree(tree_oid)?;
        let sig = Signature::now(&author_name, &author_email)?;
        let oid = repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &[&parent])?;
        Ok(oid)
    })
    .await
    .map_err(|e| AppError::Git(format!("Commit task panicked: {e}")))?
}

/// Force-push a local branch to the same name on origin.
///
/// The branch is owned by the agent, so the remote always takes the local state.
pub async fn force_push(dir: &Path, branch_name: &str, token: &str) -> Result<()> {
    validate_branch_name(branch_name)?;

    let dir = dir.to_path_buf();
    let branch_name = branch_name.to_string();
    let token = token.to_string();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut remote = repo.find_remote("origin")?;
        let refspec = format!("+refs/heads/{branch_name}:refs/heads/{branch_name}");
        let mut push_opts = make_push_options(&token);
        remote.push(&[&refspec], Some(&mut push_opts))?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Git(format!("Force-push task panicked: {e}")))?
}

/// Whether the last fetch saw `branch_name` on origin.
pub async fn remote_branch_exists(dir: &Path, branch_name: &str) -> Result<bool> {
    let dir = dir.to_path_buf();
    let remote_ref = format!("refs/remotes/origin/{branch_name}");

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let exists = repo.find_reference(&remote_ref).is_ok();
        Ok(exists)
    })
    .await
    .map_err(|e| AppError::Git(format!("Remote-branch task panicked: {e}")))?
}

/// Check for tracked modifications or untracked (non-ignored) files.
pub async fn has_changes(dir: &Path) -> Result<bool> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    })
    .await
    .map_err(|e| AppError::Git(format!("Has-changes task panicked: {e}")))?
}

/// Unified diff of the working tree (untracked files included) against HEAD.
pub async fn diff_head(dir: &Path) -> Result<String> {
    let dir = dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let repo = Repository::open(&dir)?;
        let head_tree = repo.head()?.peel_to_tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .show_untracked_content(true);
        let diff = repo.diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))?;

        let mut out = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                out.push(line.origin());
            }
            out.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        Ok(out)
    })
    .await
    .map_err(|e| AppError::Git(format!("Diff task panicked: {e}")))?
}
