//! Output unit of the space router.

use super::rule::ContentKind;

/// A space the message should be published to, and as what.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Destination {
    pub space_key: String,
    pub content_type: ContentKind,
}

impl Destination {
    pub fn new(space_key: impl Into<String>, content_type: ContentKind) -> Self {
        Self {
            space_key: space_key.into(),
            content_type,
        }
    }
}
