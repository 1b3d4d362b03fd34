//! Loading individual `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::Path;

use crate::error::{MailspaceError, Result};
use crate::parser::source::ParsedMail;

/// Read a `.eml` file into memory.
pub fn read_eml(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MailspaceError::FileNotFound(path.to_path_buf())
        } else {
            MailspaceError::io(path, e)
        }
    })
}

/// Parse bytes previously read from `path`.
///
/// `path` is only used to name the file in the error.
pub fn parse_eml<'x>(path: impl AsRef<Path>, raw: &'x [u8]) -> Result<ParsedMail<'x>> {
    if find_header_end(raw).is_none() && !raw.contains(&b':') {
        return Err(MailspaceError::InvalidMessage(path.as_ref().to_path_buf()));
    }
    ParsedMail::parse(raw).ok_or_else(|| MailspaceError::InvalidMessage(path.as_ref().to_path_buf()))
}

/// Find the byte offset where headers end (position of the first blank line).
fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i);
        }
    }
    None
}
