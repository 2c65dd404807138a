//! Parsing of model output: delimited file blocks and PR metadata JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::workspace::git::is_valid_branch_name;

pub const START_MARKER: &str = "--- START OF FILE: ";
pub const END_MARKER: &str = "--- END OF FILE: ";
const MARKER_SUFFIX: &str = " ---";

static START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--- START OF FILE: (.+?) ---\r?\n").expect("valid regex"));

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A```[\w.+#-]*[ \t]*\r?\n(.*?)\r?\n```\z").expect("valid regex")
});

/// One intended file replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: String,
    /// Content as emitted by the model; may still carry a code fence.
    pub content: String,
}

/// Ordered edits with unique paths.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EditSet {
    edits: Vec<FileEdit>,
}

impl EditSet {
    /// Add an edit. A repeated path replaces the earlier content in place.
    pub fn insert(&mut self, path: String, content: String) {
        match self.edits.iter_mut().find(|e| e.path == path) {
            Some(existing) => existing.content = content,
            None => self.edits.push(FileEdit { path, content }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEdit> {
        self.edits.iter()
    }
}

/// Extract every well-formed `START`/`END` block from a model response.
///
/// A block only counts when its END marker repeats the START path exactly;
/// unmatched STARTs are dropped and scanning resumes after them.
pub fn parse_file_edits(response: &str) -> EditSet {
    let mut edits = EditSet::default();
    let mut cursor = 0;

    while let Some(caps) = START_RE.captures_at(response, cursor) {
        let (Some(start), Some(path_match)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let raw_path = path_match.as_str();
        let content_start = start.end();
        let end_marker = format!("\n{END_MARKER}{raw_path}{MARKER_SUFFIX}");

        // The newline closing the START line may double as the one before END.
        match response[content_start - 1..].find(&end_marker) {
            Some(offset) => {
                let content_end = (content_start - 1 + offset).max(content_start);
                let path = raw_path.trim();
                if path.is_empty() {
                    tracing::warn!("Dropping file block with an empty path");
                } else {
                    edits.insert(
                        path.to_string(),
                        response[content_start..content_end].to_string(),
                    );
                }
                cursor = content_start - 1 + offset + end_marker.len();
            }
            None => {
                tracing::warn!(path = raw_path, "Dropping file block without matching END marker");
                cursor = content_start;
            }
        }
    }

    edits
}

/// Remove code fences wrapping the whole content (```lang ... ```).
///
/// Content that is not entirely fenced comes back unchanged. Nested wrappers are
/// peeled until none is left, so applying this twice equals applying it once.
pub fn strip_code_fence(content: &str) -> &str {
    let mut current = content;
    loop {
        let trimmed = current.trim_matches(|c| c == '\n' || c == '\r');
        match FENCE_RE.captures(trimmed).and_then(|c| c.get(1)) {
            Some(inner) => current = inner.as_str(),
            None => return current,
        }
    }
}

/// Branch and PR fields derived for an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrMetadata {
    pub branch_name: String,
    pub pr_title: String,
    pub commit_message: String,
    pub pr_description: String,
}

#[derive(Deserialize)]
struct RawPrMetadata {
    branch_name: String,
    pr_title: String,
    commit_message: Option<String>,
    pr_description: String,
}

impl PrMetadata {
    /// Deterministic values used whenever the model's answer is unusable.
    pub fn fallback(issue_number: u64, issue_title: &str) -> Self {
        Self {
            branch_name: format!("fix/issue-{issue_number}"),
            pr_title: format!("Fix: {issue_title}"),
            commit_message: format!("feat: Fix for issue #{issue_number}"),
            pr_description: format!(
                "This PR is an AI-generated solution for issue #{issue_number}.\n\n\
                 **Issue:** {issue_title}\n\n\
                 *Please review the changes carefully before merging.*"
            ),
        }
    }
}

/// Parse the metadata JSON object out of a model response.
///
/// Any failure is an error; the caller swaps in [`PrMetadata::fallback`] whole.
pub fn parse_pr_metadata(response: &str) -> Result<PrMetadata> {
    let span = extract_json_object(response)
        .ok_or_else(|| AppError::Protocol("no JSON object in metadata response".to_string()))?;
    let raw: RawPrMetadata = serde_json::from_str(span)
        .map_err(|e| AppError::Protocol(format!("invalid metadata JSON: {e}")))?;

    let branch_name = raw.branch_name.trim().to_string();
    if !is_valid_branch_name(&branch_name) {
        return Err(AppError::Protocol(format!(
            "unusable branch name: {:?}",
            raw.branch_name
        )));
    }
    let pr_title = raw.pr_title.trim().to_string();
    if pr_title.is_empty() {
        return Err(AppError::Protocol("empty pr_title".to_string()));
    }

    let commit_message = raw
        .commit_message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| pr_title.clone());

    Ok(PrMetadata {
        branch_name,
        pr_title,
        commit_message,
        pr_description: raw.pr_description.trim().to_string(),
    })
}

/// First top-level `{...}` span, matching braces outside string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Clean a free-text commit message. `None` when nothing usable remains.
pub fn clean_commit_message(response: &str) -> Option<String> {
    let message = strip_code_fence(response.trim())
        .trim()
        .trim_matches('`')
        .trim();
    (!message.is_empty()).then(|| message.to_string())
}
