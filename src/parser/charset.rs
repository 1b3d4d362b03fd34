//! Charset resolution for text parts.
//!
//! Labels are looked up with `encoding_rs`. IBM code page 437 is not a WHATWG
//! encoding but still shows up in mail from older clients, so it is decoded
//! from a built-in table. Anything else unknown falls back to UTF-8.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

/// A resolved character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Standard(&'static Encoding),
    Ibm437,
}

impl Default for Charset {
    fn default() -> Self {
        Self::Standard(UTF_8)
    }
}

impl Charset {
    /// Resolve a charset label, e.g. `"utf-8"`, `"ISO-8859-1"`, `"CP437"`.
    pub fn for_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        match lower.as_str() {
            "cp437" | "ibm437" | "437" | "cspc8codepage437" => Some(Self::Ibm437),
            _ => Encoding::for_label(lower.as_bytes()).map(Self::Standard),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard(encoding) => encoding.name(),
            Self::Ibm437 => "IBM437",
        }
    }

    /// Decode bytes, replacing malformed sequences.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        match self {
            Self::Standard(encoding) => {
                let (text, _) = encoding.decode_with_bom_removal(bytes);
                text
            }
            Self::Ibm437 => {
                if bytes.is_ascii() {
                    // ASCII is a subset of CP437.
                    return String::from_utf8_lossy(bytes);
                }
                Cow::Owned(
                    bytes
                        .iter()
                        .map(|&b| {
                            if b < 0x80 {
                                b as char
                            } else {
                                CP437_HIGH[(b - 0x80) as usize]
                            }
                        })
                        .collect(),
                )
            }
        }
    }
}

/// Find the `charset=` parameter of a Content-Type header value.
///
/// The key is matched case-insensitively and the value may be quoted.
/// A missing or unrecognised charset resolves to the default (UTF-8).
pub fn charset_from_header(content_type: &str) -> Charset {
    let Some(label) = charset_label(content_type) else {
        return Charset::default();
    };
    match Charset::for_label(label) {
        Some(charset) => charset,
        None => {
            debug!(charset = label, "Unknown charset, falling back to UTF-8");
            Charset::default()
        }
    }
}

/// The raw label after `charset=`, made of ASCII alphanumerics and hyphens.
fn charset_label(content_type: &str) -> Option<&str> {
    let lower = content_type.to_ascii_lowercase();
    let key = lower.find("charset=")?;
    let mut start = key + "charset=".len();
    if content_type[start..].starts_with('"') {
        start += 1;
    }
    let rest = &content_type[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

/// Code points for bytes 0x80..=0xFF in code page 437.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];
