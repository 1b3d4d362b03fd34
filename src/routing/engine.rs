//! Ordered evaluation of routing rules against one message.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::{RegexError, Result};
use crate::model::destination::Destination;
use crate::model::rule::{Rule, RuleAction, RuleField, RuleOperator, SpaceTarget};
use crate::parser::source::MessageFields;
use crate::policy::SpaceValidator;
use crate::routing::bounded::RegexEvaluator;

/// Decides which spaces a message is published to.
///
/// Holds no per-message state; one router can serve any number of messages.
pub struct SpaceRouter<'a> {
    spaces: &'a dyn SpaceValidator,
    regex: Arc<RegexEvaluator>,
}

impl<'a> SpaceRouter<'a> {
    /// Router backed by the process-wide regex pool.
    pub fn new(spaces: &'a dyn SpaceValidator) -> Self {
        Self::with_evaluator(spaces, RegexEvaluator::shared())
    }

    pub fn with_evaluator(spaces: &'a dyn SpaceValidator, regex: Arc<RegexEvaluator>) -> Self {
        Self { spaces, regex }
    }

    /// Evaluate `config.rules` in order and collect the destinations.
    ///
    /// A key is emitted at most once. A matching move rule ends evaluation
    /// and suppresses the default space. Failures on a single rule or value
    /// are logged and skipped; this never fails as a whole.
    pub fn get_spaces(
        &self,
        config: &Configuration,
        message: &dyn MessageFields,
    ) -> Vec<Destination> {
        let mut destinations = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, rule) in config.rules.iter().enumerate() {
            let values = match candidate_values(rule.field, message) {
                Ok(values) => values,
                Err(e) => {
                    warn!(rule = index, field = rule.field.as_str(), error = %e, "Skipping rule");
                    continue;
                }
            };

            let mut matched = false;
            for value in &values {
                match self.eval_condition(rule, value) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(rule = index, value = %value, error = %e, "Rule condition failed");
                        continue;
                    }
                }
                matched = true;

                let key = match self.space_key(rule, value) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(rule = index, value = %value, error = %e, "No space key for value");
                        continue;
                    }
                };
                self.push_destination(&mut destinations, &mut seen, key, rule);
            }

            if matched && rule.action == RuleAction::Move {
                debug!(rule = index, "Move rule matched, stopping");
                return destinations;
            }
        }

        if seen.contains(&config.default_space) {
            debug!(space = %config.default_space, "Default space already selected");
        } else if self.spaces.space_exists(&config.default_space) {
            destinations.push(Destination::new(
                config.default_space.clone(),
                config.default_content_type,
            ));
        } else {
            warn!(space = %config.default_space, "Default space does not exist, omitting it");
        }

        destinations
    }

    /// Whether `rule` accepts `value`. Comparisons ignore case.
    pub fn eval_condition(&self, rule: &Rule, value: &str) -> std::result::Result<bool, RegexError> {
        let lowered = value.to_lowercase();
        let wanted = rule.value.to_lowercase();
        Ok(match rule.operator {
            RuleOperator::Equals => lowered == wanted,
            RuleOperator::Contains => lowered.contains(&wanted),
            RuleOperator::StartsWith => lowered.starts_with(&wanted),
            RuleOperator::EndsWith => lowered.ends_with(&wanted),
            RuleOperator::Regex => return self.regex.is_match(&rule.value, value),
        })
    }

    /// The space a matching `value` is routed to.
    pub fn space_key(&self, rule: &Rule, value: &str) -> std::result::Result<String, RegexError> {
        match &rule.target {
            SpaceTarget::Key(key) => Ok(key.clone()),
            SpaceTarget::CaptureGroup(group) => self.regex.capture(&rule.value, value, *group),
        }
    }

    fn push_destination(
        &self,
        destinations: &mut Vec<Destination>,
        seen: &mut HashSet<String>,
        key: String,
        rule: &Rule,
    ) {
        if seen.contains(&key) {
            debug!(space = %key, "Space already selected");
            return;
        }
        if !self.spaces.space_exists(&key) {
            warn!(space = %key, "Space does not exist, skipping");
            return;
        }
        seen.insert(key.clone());
        destinations.push(Destination::new(key, rule.content_type));
    }
}

/// Values of `field` in the order rules see them.
fn candidate_values(field: RuleField, message: &dyn MessageFields) -> Result<Vec<String>> {
    match field {
        RuleField::From => message.from(),
        RuleField::To => message.to(),
        RuleField::Cc => message.cc(),
        RuleField::ToOrCc => {
            let mut values = message.to()?;
            values.extend(message.cc()?);
            Ok(values)
        }
        RuleField::Subject => message.subject().map(|s| vec![s.trim().to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MailspaceError;
    use crate::model::rule::ContentKind;
    use std::time::Duration;

    #[derive(Default)]
    struct Fields {
        from: Vec<&'static str>,
        to: Vec<&'static str>,
        cc: Vec<&'static str>,
        subject: Option<&'static str>,
    }

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    impl MessageFields for Fields {
        fn from(&self) -> Result<Vec<String>> {
            Ok(owned(&self.from))
        }
        fn to(&self) -> Result<Vec<String>> {
            Ok(owned(&self.to))
        }
        fn cc(&self) -> Result<Vec<String>> {
            Ok(owned(&self.cc))
        }
        fn subject(&self) -> Result<String> {
            self.subject
                .map(String::from)
                .ok_or(MailspaceError::FieldExtraction { field: "subject" })
        }
    }

    fn rule(field: RuleField, operator: RuleOperator, value: &str, action: RuleAction, space: &str) -> Rule {
        let target = match space {
            "_group_0" => SpaceTarget::CaptureGroup(0),
            "_group_1" => SpaceTarget::CaptureGroup(1),
            key => SpaceTarget::Key(key.to_string()),
        };
        Rule {
            field,
            operator,
            value: value.to_string(),
            action,
            target,
            content_type: ContentKind::Blog,
        }
    }

    fn config(rules: Vec<Rule>) -> Configuration {
        Configuration {
            default_space: "default".into(),
            rules,
            ..Configuration::default()
        }
    }

    fn any_space(_: &str) -> bool {
        true
    }

    fn keys(destinations: &[Destination]) -> Vec<&str> {
        destinations.iter().map(|d| d.space_key.as_str()).collect()
    }

    #[test]
    fn test_no_rules_returns_default() {
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(vec![]), &Fields::default());
        assert_eq!(spaces, vec![Destination::new("default", ContentKind::Blog)]);
    }

    #[test]
    fn test_move_short_circuits() {
        let fields = Fields {
            subject: Some("hello"),
            ..Fields::default()
        };
        let rules = vec![
            rule(RuleField::Subject, RuleOperator::Contains, "hel", RuleAction::Copy, "paris"),
            rule(RuleField::Subject, RuleOperator::Contains, "ell", RuleAction::Move, "berlin"),
            rule(RuleField::Subject, RuleOperator::Contains, "llo", RuleAction::Copy, "rome"),
        ];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["paris", "berlin"]);
    }

    #[test]
    fn test_unmatched_move_does_not_stop() {
        let fields = Fields {
            subject: Some("hello"),
            ..Fields::default()
        };
        let rules = vec![
            rule(RuleField::Subject, RuleOperator::Equals, "bye", RuleAction::Move, "berlin"),
            rule(RuleField::Subject, RuleOperator::Equals, "HELLO", RuleAction::Copy, "rome"),
        ];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["rome", "default"]);
    }

    #[test]
    fn test_duplicate_keys_emitted_once() {
        let fields = Fields {
            to: vec!["a@shop.de", "b@shop.de"],
            cc: vec!["c@shop.de"],
            ..Fields::default()
        };
        let rules = vec![
            rule(RuleField::ToOrCc, RuleOperator::EndsWith, "shop.de", RuleAction::Copy, "paris"),
            rule(RuleField::To, RuleOperator::StartsWith, "a@", RuleAction::Copy, "paris"),
            rule(RuleField::Cc, RuleOperator::Contains, "@", RuleAction::Copy, "default"),
        ];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["paris", "default"]);
    }

    #[test]
    fn test_missing_subject_skips_rule() {
        let rules = vec![rule(
            RuleField::Subject,
            RuleOperator::Contains,
            "x",
            RuleAction::Move,
            "paris",
        )];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &Fields::default());
        assert_eq!(keys(&spaces), vec!["default"]);
    }

    #[test]
    fn test_invalid_keys_are_skipped() {
        fn only_rome(key: &str) -> bool {
            key == "rome"
        }
        let fields = Fields {
            from: vec!["x@example.org"],
            ..Fields::default()
        };
        let rules = vec![
            rule(RuleField::From, RuleOperator::Contains, "x", RuleAction::Copy, "paris"),
            rule(RuleField::From, RuleOperator::Contains, "x", RuleAction::Copy, "rome"),
        ];
        let router = SpaceRouter::new(&only_rome);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["rome"]);
    }

    #[test]
    fn test_capture_group_keys() {
        let fields = Fields {
            subject: Some("echo 42"),
            ..Fields::default()
        };
        let rules = vec![
            rule(RuleField::Subject, RuleOperator::Regex, "echo ([0-9]*)", RuleAction::Copy, "_group_1"),
            rule(RuleField::Subject, RuleOperator::Regex, "echo ([0-9]*)", RuleAction::Copy, "_group_0"),
        ];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["42", "echo 42", "default"]);
    }

    #[test]
    fn test_missing_group_skips_value_but_rule_still_matches() {
        let fields = Fields {
            subject: Some("echo"),
            ..Fields::default()
        };
        let rules = vec![rule(
            RuleField::Subject,
            RuleOperator::Regex,
            "^echo$",
            RuleAction::Move,
            "_group_1",
        )];
        let router = SpaceRouter::new(&any_space);
        let spaces = router.get_spaces(&config(rules), &fields);
        assert!(spaces.is_empty());
    }

    #[test]
    fn test_regex_timeout_is_contained() {
        let fields = Fields {
            subject: Some("anything"),
            ..Fields::default()
        };
        let rules = vec![rule(
            RuleField::Subject,
            RuleOperator::Regex,
            "any",
            RuleAction::Move,
            "paris",
        )];
        let regex = Arc::new(RegexEvaluator::new(1, Duration::ZERO));
        let router = SpaceRouter::with_evaluator(&any_space, regex);

        let r = &rules[0];
        assert!(router.eval_condition(r, "anything").unwrap_err().is_timeout());

        let spaces = router.get_spaces(&config(rules), &fields);
        assert_eq!(keys(&spaces), vec!["default"]);
    }

    #[test]
    fn test_capture_timeout_after_plain_match() {
        let fields = Fields {
            subject: Some("echo 42"),
            ..Fields::default()
        };
        let r = rule(RuleField::Subject, RuleOperator::Contains, "echo", RuleAction::Move, "_group_1");
        let regex = Arc::new(RegexEvaluator::new(1, Duration::ZERO));
        let router = SpaceRouter::with_evaluator(&any_space, regex);

        assert!(router.eval_condition(&r, "echo 42").unwrap());
        assert!(router.space_key(&r, "echo 42").unwrap_err().is_timeout());

        // The condition matched, so the move still ends routing with no key.
        assert!(router.get_spaces(&config(vec![r]), &fields).is_empty());
    }

    #[test]
    fn test_operators_ignore_case() {
        let router = SpaceRouter::new(&any_space);
        let cases = [
            (RuleOperator::Equals, "Alpha@Example.org", true),
            (RuleOperator::Equals, "alpha", false),
            (RuleOperator::Contains, "EXAMPLE", true),
            (RuleOperator::StartsWith, "ALPHA@", true),
            (RuleOperator::EndsWith, ".ORG", true),
            (RuleOperator::EndsWith, ".com", false),
            (RuleOperator::Regex, "^alpha@.*\\.org$", true),
        ];
        for (operator, value, expected) in cases {
            let r = rule(RuleField::From, operator, value, RuleAction::Copy, "x");
            assert_eq!(
                router.eval_condition(&r, "alpha@example.org").unwrap(),
                expected,
                "{operator:?} {value}"
            );
        }
    }
}
