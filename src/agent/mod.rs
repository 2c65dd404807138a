pub mod claude;
pub mod prompt;
pub mod protocol;

use async_trait::async_trait;

use crate::context::Attachment;
use crate::error::Result;

/// A text-generation service: one prompt (plus images) in, free text out.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, attachments: &[Attachment]) -> Result<String>;
}
