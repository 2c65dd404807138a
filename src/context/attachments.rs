use std::collections::HashSet;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

use crate::context::Attachment;
use crate::error::Result;
use crate::platform::Platform;

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// Image URLs referenced by `<img>` tags, in document order without duplicates.
pub fn extract_image_urls(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    IMG_SRC_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Resolve the media type of a fetched resource.
///
/// The response header wins unless it is missing or generic, in which case the
/// URL's extension is consulted.
fn classify(content_type: Option<&str>, url: &str) -> Option<String> {
    let from_header = content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .filter(|essence| !essence.is_empty() && essence != "application/octet-stream");

    from_header.or_else(|| {
        let path = Url::parse(url).ok()?.path().to_string();
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    })
}

async fn fetch_one(client: &Client, url: &str) -> Result<Option<Attachment>> {
    let response = client.get(url).send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(mime_type) = classify(content_type.as_deref(), url) else {
        tracing::debug!(url, "Skipping attachment with unknown content type");
        return Ok(None);
    };
    if !mime_type.starts_with("image/") {
        tracing::debug!(url, mime = %mime_type, "Skipping non-image attachment");
        return Ok(None);
    }

    let data = response.bytes().await?.to_vec();
    Ok(Some(Attachment {
        mime_type,
        data,
        source_url: url.to_string(),
    }))
}

/// Download every URL concurrently. Failures and non-images are skipped.
pub async fn fetch_attachments(client: &Client, urls: &[String]) -> Vec<Attachment> {
    let results = join_all(urls.iter().map(|url| fetch_one(client, url))).await;

    urls.iter()
        .zip(results)
        .filter_map(|(url, result)| match result {
            Ok(attachment) => attachment,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to fetch attachment");
                None
            }
        })
        .collect()
}

/// Best-effort image attachments of an issue. Never fails; an unreadable issue
/// yields no attachments.
pub async fn fetch_issue_attachments(
    platform: &dyn Platform,
    client: &Client,
    installation_id: Option<u64>,
    repo_full_name: &str,
    issue_number: u64,
) -> Vec<Attachment> {
    let html = match platform
        .get_issue_html(installation_id, repo_full_name, issue_number)
        .await
    {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(
                repo = repo_full_name,
                issue = issue_number,
                error = %e,
                "Could not fetch rendered issue body; continuing without attachments"
            );
            return Vec::new();
        }
    };

    let urls = extract_image_urls(&html);
    if urls.is_empty() {
        return Vec::new();
    }

    let attachments = fetch_attachments(client, &urls).await;
    tracing::info!(
        issue = issue_number,
        found = urls.len(),
        fetched = attachments.len(),
        "Fetched issue attachments"
    );
    attachments
}
