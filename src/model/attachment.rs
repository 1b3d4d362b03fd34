//! Attachment payload and metadata.
//!
//! Unlike content parts, attachments are read fully into memory during
//! extraction so their size is known before anything is published.

use chrono::{DateTime, Utc};

/// A binary part pulled out of a message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Attachment {
    /// Filename after sanitizing. Generated if missing from the headers.
    pub filename: String,

    /// MIME media type (e.g. `"image/gif"`, `"application/pdf"`), lowercased.
    pub media_type: String,

    /// Number of bytes read from the part stream.
    pub file_size: u64,

    /// Set to the wall-clock time of extraction.
    pub created: DateTime<Utc>,

    /// Same instant as `created`.
    pub modified: DateTime<Utc>,

    /// Decoded bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Build an attachment stamped with the current time.
    pub fn new(filename: String, media_type: String, data: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            filename,
            media_type,
            file_size: data.len() as u64,
            created: now,
            modified: now,
            data,
        }
    }
}
