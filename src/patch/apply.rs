use std::path::{Component, Path, PathBuf};

use crate::agent::protocol::{strip_code_fence, EditSet};
use crate::error::Result;

/// Resolve a model-supplied path against `root` without touching the filesystem.
///
/// Returns `None` for absolute paths, paths that climb out of `root`, and
/// anything under `.git` (any case). Symlinks are checked separately by
/// `escapes_root`.
pub fn resolve_edit_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !clean.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let first = clean.components().next()?;
    if first.as_os_str().eq_ignore_ascii_case(".git") {
        return None;
    }
    Some(root.join(clean))
}

/// Whether writing `full_path` would leave `root` through a symlink already in
/// the working copy: either the target itself is a link, or its nearest
/// existing ancestor resolves outside `root`.
async fn escapes_root(root: &Path, full_path: &Path) -> Result<bool> {
    let root = tokio::fs::canonicalize(root).await?;

    if let Ok(meta) = tokio::fs::symlink_metadata(full_path).await {
        if meta.file_type().is_symlink() {
            return Ok(true);
        }
    }

    let mut ancestor = full_path.parent();
    while let Some(dir) = ancestor {
        match tokio::fs::canonicalize(dir).await {
            Ok(real) => return Ok(!real.starts_with(&root)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ancestor = dir.parent(),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// File bytes for an edit: fence removed, surrounding blank lines dropped,
/// exactly one trailing newline.
fn normalize_content(raw: &str) -> String {
    let inner = strip_code_fence(raw);
    let trimmed = inner.trim_matches(|c| c == '\n' || c == '\r');
    let mut content = trimmed.trim_end().to_string();
    content.push('\n');
    content
}

/// Write every edit into the working copy.
///
/// Unsafe paths are skipped with a warning. Returns the paths actually written,
/// relative to `root`, in edit order.
pub async fn apply(root: &Path, edits: &EditSet) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(edits.len());

    for edit in edits.iter() {
        let Some(full_path) = resolve_edit_path(root, &edit.path) else {
            tracing::warn!(path = %edit.path, "Refusing to write outside the working copy");
            continue;
        };
        if escapes_root(root, &full_path).await? {
            tracing::warn!(path = %edit.path, "Refusing to write through a symlink");
            continue;
        }

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full_path, normalize_content(&edit.content)).await?;

        tracing::info!(path = %edit.path, "Updated file");
        let relative = full_path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| full_path.clone());
        written.push(relative);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn edits(pairs: &[(&str, &str)]) -> EditSet {
        let mut set = EditSet::default();
        for (path, content) in pairs {
            set.insert(path.to_string(), content.to_string());
        }
        set
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/repo");
        assert_eq!(
            resolve_edit_path(root, "lib/a.dart"),
            Some(PathBuf::from("/repo/lib/a.dart"))
        );
        assert_eq!(
            resolve_edit_path(root, "./lib/../lib/b.dart"),
            Some(PathBuf::from("/repo/lib/b.dart"))
        );
        assert_eq!(resolve_edit_path(root, "../outside.txt"), None);
        assert_eq!(resolve_edit_path(root, "lib/../../outside.txt"), None);
        assert_eq!(resolve_edit_path(root, "/etc/passwd"), None);
        assert_eq!(resolve_edit_path(root, ".git/config"), None);
        assert_eq!(resolve_edit_path(root, ".GIT/config"), None);
        assert_eq!(resolve_edit_path(root, "lib/../.Git/HEAD"), None);
        assert_eq!(resolve_edit_path(root, "."), None);
    }

    #[test]
    fn test_normalize_strips_fence_and_fixes_newline() {
        assert_eq!(normalize_content("```dart\nvoid main() {}\n```"), "void main() {}\n");
        assert_eq!(normalize_content("\n\nplain\n\n\n"), "plain\n");
        assert_eq!(normalize_content("  indented\n"), "  indented\n");
    }

    #[tokio::test]
    async fn test_apply_writes_files_and_creates_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let set = edits(&[
            ("lib/src/new.dart", "```dart\nclass A {}\n```"),
            ("README.md", "hello"),
        ]);

        let written = apply(tmp.path(), &set).await.unwrap();

        assert_eq!(
            written,
            vec![PathBuf::from("lib/src/new.dart"), PathBuf::from("README.md")]
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("lib/src/new.dart")).unwrap(),
            "class A {}\n"
        );
        assert_eq!(fs::read_to_string(tmp.path().join("README.md")).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_apply_skips_unsafe_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("repo");
        fs::create_dir_all(&root).unwrap();
        let set = edits(&[("../escape.txt", "x"), ("ok.txt", "y")]);

        let written = apply(&root, &set).await.unwrap();

        assert_eq!(written, vec![PathBuf::from("ok.txt")]);
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_refuses_to_follow_symlinks_out_of_the_repo() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("repo");
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("victim.txt"), "original").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("docs")).unwrap();
        std::os::unix::fs::symlink(outside.join("victim.txt"), root.join("link.txt")).unwrap();

        let set = edits(&[
            ("docs/new.txt", "x"),
            ("docs/nested/deeper.txt", "x"),
            ("link.txt", "overwritten"),
            ("ok.txt", "y"),
        ]);
        let written = apply(&root, &set).await.unwrap();

        assert_eq!(written, vec![PathBuf::from("ok.txt")]);
        assert!(!outside.join("new.txt").exists());
        assert!(!outside.join("nested").exists());
        assert_eq!(fs::read_to_string(outside.join("victim.txt")).unwrap(), "original");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_allows_symlinks_that_stay_inside() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("lib")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("lib"), tmp.path().join("src")).unwrap();

        let written = apply(tmp.path(), &edits(&[("src/a.dart", "a")])).await.unwrap();

        assert_eq!(written, vec![PathBuf::from("src/a.dart")]);
        assert_eq!(fs::read_to_string(tmp.path().join("lib/a.dart")).unwrap(), "a\n");
    }

    #[tokio::test]
    async fn test_apply_empty_set_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let written = apply(tmp.path(), &EditSet::default()).await.unwrap();
        assert!(written.is_empty());
    }
}
