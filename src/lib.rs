//! `mailspace`: turn inbound e-mail into publishable content and route it
//! to destination spaces.
//!
//! Two independent engines make up the crate: [`parser::mime::MimeExtractor`]
//! flattens a message into content parts and attachments, and
//! [`routing::engine::SpaceRouter`] evaluates the configured rules to decide
//! where the content goes.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod policy;
pub mod routing;
