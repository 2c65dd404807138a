use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::agent::ModelClient;
use crate::config::ModelConfig;
use crate::context::Attachment;
use crate::error::{AppError, Result};

const API_VERSION: &str = "2023-06-01";

/// Image media types the Messages API accepts inline.
const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeClient {
    pub fn new(config: &ModelConfig, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("tendril/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: model.to_string(),
            max_tokens: config.max_tokens,
        })
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Model(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Model(format!("API returned {status}: {body}")));
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| AppError::Model(format!("invalid response body: {e}")))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &str, attachments: &[Attachment]) -> MessagesRequest {
        let mut content: Vec<ContentBlock> = attachments
            .iter()
            .filter_map(|attachment| {
                if !SUPPORTED_IMAGE_TYPES.contains(&attachment.mime_type.as_str()) {
                    tracing::debug!(
                        url = %attachment.source_url,
                        mime = %attachment.mime_type,
                        "Skipping attachment with unsupported media type"
                    );
                    return None;
                }
                Some(ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64".to_string(),
                        media_type: attachment.mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(&attachment.data),
                    },
                })
            })
            .collect();
        content.push(ContentBlock::Text {
            text: prompt.to_string(),
        });

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user".to_string(),
                content,
            }],
        }
    }
}

#[async_trait]
impl ModelClient for ClaudeClient {
    async fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String> {
        let request = self.build_request(prompt, attachments);
        let response = self.send_message(&request).await?;

        tracing::debug!(
            model = %self.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Model call finished"
        );
        if response.stop_reason.as_deref() == Some("max_tokens") {
            tracing::warn!(
                model = %self.model,
                max_tokens = self.max_tokens,
                "Model response was truncated; incomplete file blocks will be dropped"
            );
        }

        let text: String = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        // Callers read an empty reply as "no edits" or as unusable metadata.
        if text.trim().is_empty() {
            tracing::warn!(model = %self.model, "Model response contained no text");
            return Ok(String::new());
        }
        Ok(text)
    }
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
