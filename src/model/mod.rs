//! Core value types: extracted message parts, attachments, routing rules and destinations.

pub mod attachment;
pub mod destination;
pub mod part;
pub mod rule;
