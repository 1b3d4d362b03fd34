//! Output unit of the MIME extractor.

use super::attachment::Attachment;

/// One flattened piece of a message: either publishable markup or an attachment.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedPart {
    /// A `text/plain`, `text/html` or `application/xhtml+xml` leaf.
    Content {
        /// Lowercased media type without parameters.
        content_type: String,
        /// Decoded text; plain text is escaped and broken with `<br />`.
        html: String,
    },

    /// Any other leaf.
    Attachment {
        /// Lowercased media type without parameters.
        content_type: String,
        attachment: Attachment,
        /// `Content-ID` header, used by HTML to reference inline images.
        content_id: Option<String>,
    },
}

impl ExtractedPart {
    pub fn content_type(&self) -> &str {
        match self {
            Self::Content { content_type, .. } | Self::Attachment { content_type, .. } => {
                content_type
            }
        }
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            Self::Content { html, .. } => Some(html),
            Self::Attachment { .. } => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::Attachment { attachment, .. } => Some(attachment),
            Self::Content { .. } => None,
        }
    }

    pub fn content_id(&self) -> Option<&str> {
        match self {
            Self::Attachment { content_id, .. } => content_id.as_deref(),
            Self::Content { .. } => None,
        }
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, Self::Attachment { .. })
    }
}
