use crate::agent::protocol::{END_MARKER, START_MARKER};

/// Instructions describing the file-block format responses must follow.
pub fn code_format_instructions() -> String {
    format!(
        r#"IMPORTANT: Provide the full, updated content for each file that needs to be changed. Your response MUST strictly follow this format, including the start and end markers, and repeat the exact same path on both markers:
{START_MARKER}path/to/your/file.ext ---
<<full updated content of the file>>
{END_MARKER}path/to/your/file.ext ---

Paths are relative to the repository root. Only include files you change. If no change is needed, include no file blocks at all."#
    )
}

pub fn issue_prompt(issue_number: u64, issue_title: &str, issue_body: &str, digest: &str) -> String {
    format!(
        r#"You are an expert software developer tasked with fixing a GitHub issue.
Analyze the issue description, any attached images, and the provided code. Generate the code changes needed to resolve the issue.

{format}

## GITHUB ISSUE #{issue_number}
- **Title:** {issue_title}
- **Description:** {issue_body}

## CODE:
{digest}"#,
        format = code_format_instructions(),
        issue_body = if issue_body.trim().is_empty() {
            "(no description)"
        } else {
            issue_body
        },
    )
}

pub fn review_prompt(review_body: &str, pr_diff: &str, digest: &str) -> String {
    format!(
        r#"You are an expert software developer revising a pull request based on feedback.
Analyze the review comments and the provided PR diff. Generate the code changes needed to address the feedback.

{format}

## REVIEW FEEDBACK:
{review_body}

## PR DIFF:
```diff
{pr_diff}
```

## CODE:
{digest}"#,
        format = code_format_instructions(),
    )
}

pub fn metadata_prompt(
    issue_number: u64,
    issue_title: &str,
    diff: &str,
    pr_template: Option<&str>,
) -> String {
    let template_section = match pr_template {
        Some(template) => format!(
            "\nWrite `pr_description` by filling in this pull request template:\n```markdown\n{template}\n```\n"
        ),
        None => String::new(),
    };

    format!(
        r#"You are preparing a pull request that resolves GitHub issue #{issue_number}: "{issue_title}".
Based on the code changes below, respond with a single JSON object and nothing else, using exactly these keys:
- "branch_name": a short git branch name such as "fix/null-crash" (lowercase, no spaces)
- "pr_title": a concise pull request title
- "commit_message": a conventional commit message summarizing the change
- "pr_description": a markdown description of what changed and why
{template_section}
## CODE DIFF:
```diff
{diff}
```"#
    )
}

pub fn commit_message_prompt(diff: &str) -> String {
    format!(
        r#"Based on the following code changes (diff), provide **only** a concise and informative git commit message that summarizes the changes.

**Code Diff:**
```diff
{diff}
```"#
    )
}
