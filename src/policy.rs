//! Collaborators the engines consult but do not own.
//!
//! The router asks a [`SpaceValidator`] whether a space key exists; the
//! extractor asks a [`FileTypePolicy`] whether an attachment may be kept and
//! what it should be called. Both come with simple in-process
//! implementations driven by configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Answers whether a destination space exists.
pub trait SpaceValidator {
    fn space_exists(&self, key: &str) -> bool;
}

impl<F> SpaceValidator for F
where
    F: Fn(&str) -> bool,
{
    fn space_exists(&self, key: &str) -> bool {
        self(key)
    }
}

/// A fixed set of space keys, usually listed in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct KnownSpaces {
    keys: HashSet<String>,
}

impl KnownSpaces {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SpaceValidator for KnownSpaces {
    fn space_exists(&self, key: &str) -> bool {
        !key.is_empty() && self.keys.contains(key)
    }
}

/// Allow-list for attachment media types and filename clean-up.
pub trait FileTypePolicy {
    /// Make `name` safe to store, given the part's media type.
    fn sanitize_filename(&self, name: &str, media_type: &str) -> String;

    /// Whether attachments of this media type may be kept.
    fn is_allowed(&self, media_type: &str) -> bool;
}

/// One permitted file type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeEntry {
    /// Extension without the leading dot, e.g. `"jpg"`.
    pub extension: String,
    /// Media type, e.g. `"image/jpeg"`.
    pub mime_type: String,
}

impl FileTypeEntry {
    pub fn new(extension: &str, mime_type: &str) -> Self {
        Self {
            extension: extension.to_ascii_lowercase(),
            mime_type: mime_type.to_ascii_lowercase(),
        }
    }
}

/// An allow-list of `(extension, media type)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBucket {
    entries: Vec<FileTypeEntry>,
}

const DEFAULT_FILE_TYPES: &[(&str, &str)] = &[
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpg"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("ics", "text/calendar"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
];

impl Default for FileTypeBucket {
    fn default() -> Self {
        Self::new(
            DEFAULT_FILE_TYPES
                .iter()
                .map(|(ext, mime)| FileTypeEntry::new(ext, mime)),
        )
    }
}

impl FileTypeBucket {
    pub fn new(entries: impl IntoIterator<Item = FileTypeEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Parse the whitespace separated `"ext mime ext mime …"` form.
    ///
    /// A trailing extension without a media type is ignored.
    pub fn parse(list: &str) -> Self {
        let tokens: Vec<&str> = list.split_whitespace().collect();
        Self::new(
            tokens
                .chunks_exact(2)
                .map(|pair| FileTypeEntry::new(pair[0], pair[1])),
        )
    }

    pub fn entries(&self) -> &[FileTypeEntry] {
        &self.entries
    }

    fn extensions_for<'a>(&'a self, media_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.mime_type.eq_ignore_ascii_case(media_type))
            .map(|e| e.extension.as_str())
    }
}

impl FileTypePolicy for FileTypeBucket {
    fn sanitize_filename(&self, name: &str, media_type: &str) -> String {
        let mut clean: String = name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        clean = clean.trim_start_matches('.').to_string();
        if clean.is_empty() {
            clean.push_str("attachment");
        }

        let current_ext = clean
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let mut allowed = self.extensions_for(media_type).peekable();
        let first = allowed.peek().copied();
        let has_known_ext = match current_ext {
            Some(ref ext) => allowed.any(|a| a == ext),
            None => false,
        };

        if !has_known_ext {
            if let Some(ext) = first {
                clean.push('.');
                clean.push_str(ext);
            }
        }
        clean
    }

    fn is_allowed(&self, media_type: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.mime_type.eq_ignore_ascii_case(media_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_spaces() {
        let spaces = KnownSpaces::new(["paris", "rome"]);
        assert!(spaces.space_exists("paris"));
        assert!(!spaces.space_exists("berlin"));
        assert!(!spaces.space_exists(""));
    }

    #[test]
    fn test_closure_validator() {
        let always = |_: &str| true;
        assert!(always.space_exists("anything"));
    }

    #[test]
    fn test_bucket_parse() {
        let bucket = FileTypeBucket::parse("jpg image/jpg png image/png");
        assert_eq!(bucket.entries().len(), 2);
        assert!(bucket.is_allowed("image/jpg"));
        assert!(bucket.is_allowed("IMAGE/PNG"));
        assert!(!bucket.is_allowed("image/gif"));
    }

    #[test]
    fn test_default_bucket_allows_common_types() {
        let bucket = FileTypeBucket::default();
        assert!(bucket.is_allowed("image/gif"));
        assert!(bucket.is_allowed("application/pdf"));
        assert!(!bucket.is_allowed("application/x-msdownload"));
    }

    #[test]
    fn test_sanitize_keeps_matching_extension() {
        let bucket = FileTypeBucket::default();
        assert_eq!(bucket.sanitize_filename("dm-logo.gif", "image/gif"), "dm-logo.gif");
        assert_eq!(bucket.sanitize_filename("Photo.JPG", "image/jpeg"), "Photo.JPG");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        let bucket = FileTypeBucket::default();
        assert_eq!(
            bucket.sanitize_filename("../../etc/passwd report.pdf", "application/pdf"),
            "_.._etc_passwd_report.pdf"
        );
        assert_eq!(bucket.sanitize_filename("...", "application/pdf"), "attachment.pdf");
    }

    #[test]
    fn test_sanitize_appends_extension() {
        let bucket = FileTypeBucket::default();
        assert_eq!(bucket.sanitize_filename("logo", "image/png"), "logo.png");
        assert_eq!(bucket.sanitize_filename("logo.exe", "image/png"), "logo.exe.png");
        // Unknown media type: nothing to append.
        assert_eq!(bucket.sanitize_filename("blob", "application/x-unknown"), "blob");
    }
}
