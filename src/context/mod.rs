//! Material handed to the model alongside a prompt.

pub mod attachments;
pub mod digest;
pub mod template;

/// An image fetched from an issue body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub source_url: String,
}

/// Everything one code-generation prompt is built from.
#[derive(Debug, Clone, Default)]
pub struct CodeContext {
    pub digest: String,
    pub attachments: Vec<Attachment>,
}
