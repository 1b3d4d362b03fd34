//! Centralized error types for mailspace.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by the mailspace library.
#[derive(Error, Debug)]
pub enum MailspaceError {
    /// A message header needed by a rule could not be read.
    #[error("Could not read field '{field}' from message")]
    FieldExtraction { field: &'static str },

    /// A MIME leaf has no usable Content-Type.
    #[error("Part has no content type")]
    UnknownContentType,

    /// The message already produced the maximum number of attachments.
    #[error("Maximum number of attachments ({limit}) exceeded")]
    AttachmentLimitExceeded { limit: i64 },

    /// An attachment grew past the configured size limit while streaming.
    #[error("Attachment larger than allowed ({limit} bytes)")]
    AttachmentSizeExceeded { limit: u64 },

    /// The file-type policy refused the attachment's media type.
    #[error("Content type forbidden: {0}")]
    ForbiddenMimeType(String),

    /// A routing rule failed validation when the configuration was accepted.
    #[error(transparent)]
    RuleValidation(#[from] RuleValidationError),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The file could not be parsed as an RFC 5322 message.
    #[error("File does not appear to be a valid message: {0}")]
    InvalidMessage(PathBuf),

    /// The configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a routing rule was rejected.
///
/// Every variant carries the offending value so the message names it.
#[derive(Error, Debug)]
pub enum RuleValidationError {
    #[error("invalid field '{0}'")]
    InvalidField(String),

    #[error("invalid operator '{0}'")]
    InvalidOperator(String),

    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("invalid space key '{0}'")]
    InvalidDestination(String),

    #[error("invalid content type '{0}'")]
    InvalidContentType(String),

    #[error("invalid regexp '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// A rule error located within a configuration.
    #[error("rule #{index}: {source}")]
    AtRule {
        index: usize,
        source: Box<RuleValidationError>,
    },
}

impl RuleValidationError {
    /// Attach the position of the offending rule.
    pub fn at_rule(self, index: usize) -> Self {
        Self::AtRule {
            index,
            source: Box::new(self),
        }
    }
}

/// Failures of the bounded regex evaluator.
#[derive(Error, Debug)]
pub enum RegexError {
    #[error("invalid regexp '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// The deadline elapsed before the match produced a result.
    #[error("regexp evaluation exceeded {0:?}")]
    Timeout(Duration),

    #[error("regexp did not match")]
    NoMatch,

    #[error("regexp has no capturing group {0}")]
    NoCapturingGroup(usize),
}

impl RegexError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Convenience alias for `Result<T, MailspaceError>`.
pub type Result<T> = std::result::Result<T, MailspaceError>;

impl MailspaceError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available, such as
/// reading a MIME part stream.
impl From<std::io::Error> for MailspaceError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<stream>"),
            source,
        }
    }
}
