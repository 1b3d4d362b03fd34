//! Routing rules.
//!
//! Rules are written by users as plain strings (see [`crate::config::RuleConfig`]).
//! They are validated exactly once, when a configuration is accepted, and turned
//! into the strongly typed [`Rule`] that the router evaluates.

use std::fmt;
use std::str::FromStr;

use crate::config::RuleConfig;
use crate::error::RuleValidationError;
use crate::policy::SpaceValidator;
use crate::routing::bounded::compile_pattern;

/// Configuration spelling of the "use capture group 0" destination.
pub const CAPTURE_GROUP_0: &str = "_group_0";
/// Configuration spelling of the "use capture group 1" destination.
pub const CAPTURE_GROUP_1: &str = "_group_1";

/// Message field a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    From,
    To,
    Cc,
    /// To addresses followed by Cc addresses.
    ToOrCc,
    Subject,
}

impl RuleField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
            Self::Cc => "cc",
            Self::ToOrCc => "to/cc",
            Self::Subject => "subject",
        }
    }
}

impl FromStr for RuleField {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from" => Ok(Self::From),
            "to" => Ok(Self::To),
            "cc" => Ok(Self::Cc),
            "to/cc" => Ok(Self::ToOrCc),
            "subject" => Ok(Self::Subject),
            other => Err(RuleValidationError::InvalidField(other.to_string())),
        }
    }
}

/// How a field value is compared. All comparisons ignore case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

impl RuleOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "is",
            Self::Contains => "contains",
            Self::StartsWith => "start",
            Self::EndsWith => "end",
            Self::Regex => "regexp",
        }
    }
}

impl FromStr for RuleOperator {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "is" => Ok(Self::Equals),
            "contains" => Ok(Self::Contains),
            "start" => Ok(Self::StartsWith),
            "end" => Ok(Self::EndsWith),
            "regexp" => Ok(Self::Regex),
            other => Err(RuleValidationError::InvalidOperator(other.to_string())),
        }
    }
}

/// What happens after a rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Keep evaluating the following rules.
    Copy,
    /// Stop after this rule and skip the default space.
    Move,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
        }
    }
}

impl FromStr for RuleAction {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            other => Err(RuleValidationError::InvalidAction(other.to_string())),
        }
    }
}

/// Kind of content created in a destination space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Blog,
    Page,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Page => "page",
        }
    }
}

impl FromStr for ContentKind {
    type Err = RuleValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blog" => Ok(Self::Blog),
            "page" => Ok(Self::Page),
            other => Err(RuleValidationError::InvalidContentType(other.to_string())),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a matching rule sends the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceTarget {
    /// A literal space key.
    Key(String),
    /// The text of a regex capture group (0 = whole match). Regex rules only.
    CaptureGroup(usize),
}

/// A validated routing rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: RuleField,
    pub operator: RuleOperator,
    /// Value to compare against; the pattern when `operator` is `Regex`.
    pub value: String,
    pub action: RuleAction,
    pub target: SpaceTarget,
    pub content_type: ContentKind,
}

impl Rule {
    /// Validate a user-authored rule.
    ///
    /// Checks run in the order field, operator, action, space, content type,
    /// pattern; the first failure is returned.
    pub fn from_config(
        raw: &RuleConfig,
        spaces: &dyn SpaceValidator,
    ) -> Result<Self, RuleValidationError> {
        let field: RuleField = raw.field.parse()?;
        let operator: RuleOperator = raw.operator.parse()?;
        let action: RuleAction = raw.action.parse()?;
        let target = parse_target(operator, &raw.space, spaces)?;
        let content_type: ContentKind = raw.content_type.parse()?;

        if operator == RuleOperator::Regex {
            compile_pattern(&raw.value).map_err(|source| RuleValidationError::InvalidPattern {
                pattern: raw.value.clone(),
                source,
            })?;
        }

        Ok(Self {
            field,
            operator,
            value: raw.value.clone(),
            action,
            target,
            content_type,
        })
    }
}

/// Capture-group sentinels are only meaningful for regex rules; anything
/// else must name an existing space.
fn parse_target(
    operator: RuleOperator,
    space: &str,
    spaces: &dyn SpaceValidator,
) -> Result<SpaceTarget, RuleValidationError> {
    if operator == RuleOperator::Regex {
        match space {
            CAPTURE_GROUP_0 => return Ok(SpaceTarget::CaptureGroup(0)),
            CAPTURE_GROUP_1 => return Ok(SpaceTarget::CaptureGroup(1)),
            _ => {}
        }
    }

    if spaces.space_exists(space) {
        Ok(SpaceTarget::Key(space.to_string()))
    } else {
        Err(RuleValidationError::InvalidDestination(space.to_string()))
    }
}
