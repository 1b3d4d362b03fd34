//! The message model the engines read from.
//!
//! [`MimePart`] is the view of one MIME node the extractor walks, and
//! [`MessageFields`] the header view the router matches rules against.
//! [`ParsedMail`] implements both on top of `mail-parser`.

use std::fmt::Write as _;
use std::io::{Cursor, Read};

use mail_parser::{Address, Addr, Message, MessageParser, MessagePart, MimeHeaders, PartType};

use crate::error::{MailspaceError, Result};

/// One node of a MIME tree.
pub trait MimePart {
    /// Raw Content-Type value including parameters, if the part declares one.
    fn content_type(&self) -> Option<String>;

    fn filename(&self) -> Option<String>;

    fn content_id(&self) -> Option<String>;

    /// Transfer-decoded body bytes.
    fn open(&self) -> std::io::Result<Box<dyn Read + '_>>;

    /// Child parts in order, or `None` for a leaf.
    fn children(&self) -> Option<Vec<Box<dyn MimePart + '_>>>;
}

/// Header fields that routing rules match against.
pub trait MessageFields {
    /// Bare sender addresses.
    fn from(&self) -> Result<Vec<String>>;

    /// Bare `To` addresses.
    fn to(&self) -> Result<Vec<String>>;

    /// Bare `Cc` addresses.
    fn cc(&self) -> Result<Vec<String>>;

    /// Subject text. A message without a subject is an error.
    fn subject(&self) -> Result<String>;
}

/// A message parsed by `mail-parser`.
#[derive(Debug)]
pub struct ParsedMail<'x> {
    message: Message<'x>,
}

impl<'x> ParsedMail<'x> {
    /// Parse a raw RFC 5322 message.
    ///
    /// A leading byte-order mark and an MBOX `From ` separator line are
    /// skipped. Returns `None` if nothing resembling a message was found.
    pub fn parse(raw: &'x [u8]) -> Option<Self> {
        let message = MessageParser::default().parse(skip_from_line(raw))?;
        if message.parts.is_empty() {
            return None;
        }
        Some(Self { message })
    }

    /// The top-level MIME part.
    pub fn root(&self) -> MailPart<'_, 'x> {
        MailPart {
            message: &self.message,
            part: &self.message.parts[0],
        }
    }

    /// Address of the first sender, if any.
    pub fn sender_email(&self) -> Option<String> {
        addresses(self.message.from()).into_iter().next()
    }
}

impl MessageFields for ParsedMail<'_> {
    fn from(&self) -> Result<Vec<String>> {
        Ok(addresses(self.message.from()))
    }

    fn to(&self) -> Result<Vec<String>> {
        Ok(addresses(self.message.to()))
    }

    fn cc(&self) -> Result<Vec<String>> {
        Ok(addresses(self.message.cc()))
    }

    fn subject(&self) -> Result<String> {
        self.message
            .subject()
            .map(|s| s.trim().to_string())
            .ok_or(MailspaceError::FieldExtraction { field: "subject" })
    }
}

/// A part of a [`ParsedMail`], resolved against its owning message.
pub struct MailPart<'m, 'x> {
    message: &'m Message<'x>,
    part: &'m MessagePart<'x>,
}

impl MailPart<'_, '_> {
    /// `mail-parser` hands text bodies out already converted to UTF-8.
    fn is_decoded_text(&self) -> bool {
        matches!(self.part.body, PartType::Text(_) | PartType::Html(_))
    }
}

impl MimePart for MailPart<'_, '_> {
    fn content_type(&self) -> Option<String> {
        let decoded = self.is_decoded_text();
        let Some(ct) = self.part.content_type() else {
            // RFC 2045 §5.2 default.
            return decoded.then(|| "text/plain; charset=utf-8".to_string());
        };

        let mut value = match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        };
        if let Some(attributes) = &ct.attributes {
            for (name, val) in attributes.iter() {
                if decoded && name.eq_ignore_ascii_case("charset") {
                    continue;
                }
                let _ = write!(value, "; {name}=\"{val}\"");
            }
        }
        if decoded {
            value.push_str("; charset=utf-8");
        }
        Some(value)
    }

    fn filename(&self) -> Option<String> {
        self.part.attachment_name().map(String::from)
    }

    fn content_id(&self) -> Option<String> {
        self.part.content_id().map(String::from)
    }

    fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.part.contents())))
    }

    fn children(&self) -> Option<Vec<Box<dyn MimePart + '_>>> {
        let PartType::Multipart(ids) = &self.part.body else {
            return None;
        };
        Some(
            ids.iter()
                .filter_map(|&id| self.message.parts.get(id))
                .map(|part| {
                    Box::new(MailPart {
                        message: self.message,
                        part,
                    }) as Box<dyn MimePart + '_>
                })
                .collect(),
        )
    }
}

/// Flatten an address header (lists and groups) into trimmed bare addresses.
fn addresses(header: Option<&Address<'_>>) -> Vec<String> {
    let Some(header) = header else {
        return Vec::new();
    };
    let addrs: Vec<&Addr<'_>> = match header {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    };
    addrs
        .into_iter()
        .filter_map(|a| a.address.as_deref())
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Skip a BOM and the `From ` separator line at the start of MBOX messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.org>\r\n\
To: bob@example.org, \"Shop\" <info@shop.de>\r\n\
Cc: carol@example.com\r\n\
Subject:   Weekly report  \r\n\
Content-Type: text/plain; charset=\"iso-8859-1\"\r\n\
\r\n\
Hello\r\n";

    #[test]
    fn test_skip_from_line() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_from_line(data).starts_with(b"Subject:"));
    }

    #[test]
    fn test_skip_from_line_no_from() {
        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_from_line(data), data);
    }

    #[test]
    fn test_message_fields() {
        let mail = ParsedMail::parse(SIMPLE).unwrap();
        assert_eq!(mail.from().unwrap(), vec!["alice@example.org"]);
        assert_eq!(mail.to().unwrap(), vec!["bob@example.org", "info@shop.de"]);
        assert_eq!(mail.cc().unwrap(), vec!["carol@example.com"]);
        assert_eq!(mail.subject().unwrap(), "Weekly report");
        assert_eq!(mail.sender_email().as_deref(), Some("alice@example.org"));
    }

    #[test]
    fn test_missing_subject_is_an_error() {
        let mail = ParsedMail::parse(b"From: a@example.org\r\n\r\nBody\r\n").unwrap();
        assert!(matches!(
            mail.subject(),
            Err(MailspaceError::FieldExtraction { field: "subject" })
        ));
        assert!(mail.cc().unwrap().is_empty());
    }

    #[test]
    fn test_decoded_text_reports_utf8() {
        let mail = ParsedMail::parse(SIMPLE).unwrap();
        let root = mail.root();
        let ct = root.content_type().unwrap();
        assert!(ct.starts_with("text/plain"));
        assert!(ct.ends_with("charset=utf-8"));
        assert!(!ct.contains("iso-8859-1"));
        assert!(root.children().is_none());
    }
}
