//! Email parsing: loading `.eml` files, the MIME tree view, charset handling and extraction.

pub mod charset;
pub mod eml;
pub mod mime;
pub mod source;
