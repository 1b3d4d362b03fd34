//! MIME extraction: flatten a message into content parts and attachments.
//!
//! The walk is depth-first and in document order. Inside
//! `multipart/alternative` only the children carrying the most preferred
//! content type survive. Leaves are either decoded into markup (plain text,
//! HTML, XHTML) or read into memory as attachments, subject to the count and
//! size limits of the configuration and the file-type policy.
//!
//! A failure anywhere below a part only drops that part's output; extraction
//! as a whole never fails.

use std::io::{ErrorKind, Read};

use tracing::debug;
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::{MailspaceError, Result};
use crate::model::attachment::Attachment;
use crate::model::part::ExtractedPart;
use crate::parser::charset::charset_from_header;
use crate::parser::source::MimePart;
use crate::policy::FileTypePolicy;

/// Attachments are streamed into memory in chunks of this size.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Line-break marker appended to each line of a plain-text part.
const LINE_BREAK: &str = "<br />";

/// One extraction pass over one message.
///
/// Holds the running attachment count, so a fresh extractor is needed for
/// every message; [`MimeExtractor::extract`] consumes it.
pub struct MimeExtractor<'a> {
    config: &'a Configuration,
    file_types: &'a dyn FileTypePolicy,
    attachments: usize,
}

impl<'a> MimeExtractor<'a> {
    pub fn new(config: &'a Configuration, file_types: &'a dyn FileTypePolicy) -> Self {
        Self {
            config,
            file_types,
            attachments: 0,
        }
    }

    /// Walk the tree below `root` and return every surviving part in order.
    pub fn extract(mut self, root: &dyn MimePart) -> Vec<ExtractedPart> {
        self.extract_part(root)
    }

    fn extract_part(&mut self, part: &dyn MimePart) -> Vec<ExtractedPart> {
        match part.children() {
            Some(children) => self.extract_multipart(part, &children),
            None => match self.extract_leaf(part) {
                Ok(extracted) => vec![extracted],
                Err(e) => {
                    debug!(error = %e, "Failed to process part of message, dropping it");
                    Vec::new()
                }
            },
        }
    }

    fn extract_multipart(
        &mut self,
        part: &dyn MimePart,
        children: &[Box<dyn MimePart + '_>],
    ) -> Vec<ExtractedPart> {
        let extracted: Vec<Vec<ExtractedPart>> = children
            .iter()
            .map(|child| self.extract_part(child.as_ref()))
            .collect();

        let alternative = part
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/alternative"));

        if alternative {
            prefer_alternative(extracted, &self.config.preferred_content_types)
        } else {
            extracted.into_iter().flatten().collect()
        }
    }

    fn extract_leaf(&mut self, part: &dyn MimePart) -> Result<ExtractedPart> {
        let raw_type = part
            .content_type()
            .ok_or(MailspaceError::UnknownContentType)?;
        let media_type = media_type(&raw_type);
        if media_type.is_empty() {
            return Err(MailspaceError::UnknownContentType);
        }

        match media_type.as_str() {
            "text/html" | "application/xhtml+xml" | "text/plain" => {
                extract_content(part, &raw_type, media_type)
            }
            _ => self.extract_attachment(part, media_type),
        }
    }

    fn extract_attachment(
        &mut self,
        part: &dyn MimePart,
        media_type: String,
    ) -> Result<ExtractedPart> {
        let limit = self.config.max_attachment_count;
        if limit >= 0 && self.attachments as i64 >= limit {
            return Err(MailspaceError::AttachmentLimitExceeded { limit });
        }

        let filename = part.filename().unwrap_or_else(|| {
            debug!("Attachment with no filename, generating one");
            Uuid::new_v4().to_string()
        });
        let filename = self.file_types.sanitize_filename(&filename, &media_type);

        if !self.file_types.is_allowed(&media_type) {
            return Err(MailspaceError::ForbiddenMimeType(media_type));
        }

        let data = read_limited(part.open()?, self.config.max_attachment_bytes)?;
        let attachment = Attachment::new(filename, media_type.clone(), data);
        self.attachments += 1;

        Ok(ExtractedPart::Attachment {
            content_type: media_type,
            attachment,
            content_id: part.content_id(),
        })
    }
}

/// Keep the children of a `multipart/alternative` that hold the most
/// preferred content type.
///
/// Preferred types are tried in order. For the first one found in any child,
/// the complete output of every child containing it is kept, siblings and
/// attachments included. With no preferred type present, everything is kept.
fn prefer_alternative(children: Vec<Vec<ExtractedPart>>, preferred: &[String]) -> Vec<ExtractedPart> {
    for wanted in preferred {
        let wanted = wanted.to_ascii_lowercase();
        let holds = |parts: &[ExtractedPart]| {
            parts
                .iter()
                .any(|p| p.content_type().starts_with(wanted.as_str()))
        };

        if children.iter().any(|c| holds(c)) {
            return children.into_iter().filter(|c| holds(c)).flatten().collect();
        }
    }
    children.into_iter().flatten().collect()
}

/// Lowercased media type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn extract_content(
    part: &dyn MimePart,
    raw_type: &str,
    media_type: String,
) -> Result<ExtractedPart> {
    let charset = charset_from_header(raw_type);
    debug!(charset = charset.name(), content_type = %media_type, "Decoding text part");
    let mut bytes = Vec::new();
    part.open()?.read_to_end(&mut bytes)?;
    let text = charset.decode(&bytes);

    let plain = media_type == "text/plain";
    let mut html = String::with_capacity(text.len() + text.len() / 8);
    for (i, line) in split_lines(&text).into_iter().enumerate() {
        if i > 0 {
            html.push('\n');
        }
        if plain {
            escape_html_into(line, &mut html);
            html.push_str(LINE_BREAK);
        } else {
            html.push_str(line);
        }
    }

    Ok(ExtractedPart::Content {
        content_type: media_type,
        html,
    })
}

/// Split on `\n`, `\r\n` or a lone `\r`. A trailing terminator does not
/// produce an empty last line.
fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn escape_html_into(line: &str, out: &mut String) {
    for ch in line.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

/// Read `reader` to the end, giving up once more than `limit` bytes arrived.
///
/// The limit is checked before every chunk, so a part of exactly `limit`
/// bytes is accepted.
fn read_limited(mut reader: impl Read, limit: u64) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        if data.len() as u64 > limit {
            return Err(MailspaceError::AttachmentSizeExceeded { limit });
        }
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        data.extend_from_slice(&chunk[..n]);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(ct: &str) -> ExtractedPart {
        ExtractedPart::Content {
            content_type: ct.to_string(),
            html: String::new(),
        }
    }

    fn attachment(ct: &str) -> ExtractedPart {
        ExtractedPart::Attachment {
            content_type: ct.to_string(),
            attachment: Attachment::new("a".into(), ct.into(), vec![1]),
            content_id: None,
        }
    }

    fn types(parts: &[ExtractedPart]) -> Vec<&str> {
        parts.iter().map(|p| p.content_type()).collect()
    }

    #[test]
    fn test_media_type() {
        assert_eq!(media_type("Text/HTML; charset=utf-8"), "text/html");
        assert_eq!(media_type("image/gif"), "image/gif");
        assert_eq!(media_type(" text/plain ; format=flowed"), "text/plain");
    }

    #[test]
    fn test_prefer_keeps_whole_matching_children() {
        let children = vec![
            vec![content("text/plain")],
            vec![content("text/html"), attachment("image/gif")],
        ];
        let preferred = vec!["text/html".to_string(), "text/plain".to_string()];
        let kept = prefer_alternative(children, &preferred);
        assert_eq!(types(&kept), vec!["text/html", "image/gif"]);
    }

    #[test]
    fn test_prefer_falls_through_to_lower_priority() {
        let children = vec![
            vec![content("text/plain"), attachment("image/png")],
            vec![attachment("application/pdf")],
        ];
        let preferred = vec!["application/xhtml+xml".to_string(), "text/plain".to_string()];
        let kept = prefer_alternative(children, &preferred);
        assert_eq!(types(&kept), vec!["text/plain", "image/png"]);
    }

    #[test]
    fn test_prefer_collects_every_matching_child() {
        let children = vec![
            vec![content("text/html")],
            vec![content("text/plain")],
            vec![content("text/html"), attachment("image/gif")],
        ];
        let preferred = vec!["text/html".to_string()];
        let kept = prefer_alternative(children, &preferred);
        assert_eq!(types(&kept), vec!["text/html", "text/html", "image/gif"]);
    }

    #[test]
    fn test_prefer_without_match_keeps_everything() {
        let children = vec![vec![content("text/plain")], vec![attachment("image/gif")]];
        let preferred = vec!["text/html".to_string()];
        let kept = prefer_alternative(children, &preferred);
        assert_eq!(types(&kept), vec!["text/plain", "image/gif"]);
    }

    #[test]
    fn test_prefer_matches_by_prefix() {
        let children = vec![vec![content("text/plain")], vec![content("text/html")]];
        let preferred = vec!["TEXT/".to_string()];
        let kept = prefer_alternative(children, &preferred);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines("a\n"), vec!["a"]);
        assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
        assert!(split_lines("").is_empty());
    }

    #[test]
    fn test_escape_html() {
        let mut out = String::new();
        escape_html_into("<b>Tom & \"Jerry\"</b>", &mut out);
        assert_eq!(out, "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_read_limited_accepts_exact_size() {
        let data = read_limited(&b"12345"[..], 5).unwrap();
        assert_eq!(data, b"12345");
    }

    #[test]
    fn test_read_limited_rejects_oversize() {
        let err = read_limited(&b"123456"[..], 5).unwrap_err();
        assert!(matches!(err, MailspaceError::AttachmentSizeExceeded { limit: 5 }));
    }

    #[test]
    fn test_read_limited_zero_limit() {
        assert!(read_limited(&b""[..], 0).unwrap().is_empty());
        assert!(read_limited(&b"x"[..], 0).is_err());
    }
}
