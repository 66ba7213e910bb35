//! Keep/remove classification of scanned resources.

use crate::config::{FilterRuleConfig, MatchKind, RuleAction};
use crate::engine::report::SkipReason;
use crate::engine::scanner::{panic_message, ScannedResource};
use crate::error::ConfigError;
use crate::resources::{Properties, ResourceTypeRegistry, TAG_PREFIX};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Decision for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum Classification {
    Remove { reason: String },
    Skip { reason: SkipReason },
}

impl Classification {
    pub fn is_remove(&self) -> bool {
        matches!(self, Classification::Remove { .. })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Remove { reason } => write!(f, "remove ({reason})"),
            Classification::Skip { reason } => write!(f, "skip ({reason})"),
        }
    }
}

/// What a rule looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleTarget {
    Identity,
    Property(String),
}

impl RuleTarget {
    fn value<'a>(&self, identity: &'a str, properties: &'a Properties) -> &'a str {
        match self {
            RuleTarget::Identity => identity,
            RuleTarget::Property(key) => properties.get(key).unwrap_or(""),
        }
    }
}

impl fmt::Display for RuleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleTarget::Identity => write!(f, "identity"),
            RuleTarget::Property(key) => write!(f, "{key}"),
        }
    }
}

#[derive(Debug)]
enum Matcher {
    Exact(String),
    Contains(String),
    Glob(glob::Pattern),
    Regex(regex::Regex),
    OlderThan(chrono::Duration),
}

impl Matcher {
    fn compile(kind: MatchKind, value: &str) -> Result<Self, String> {
        Ok(match kind {
            MatchKind::Exact => Matcher::Exact(value.to_string()),
            MatchKind::Contains => Matcher::Contains(value.to_string()),
            MatchKind::Glob => {
                Matcher::Glob(glob::Pattern::new(value).map_err(|e| e.to_string())?)
            }
            MatchKind::Regex => {
                Matcher::Regex(regex::Regex::new(value).map_err(|e| e.to_string())?)
            }
            MatchKind::DateOlderThan => Matcher::OlderThan(parse_age(value)?),
        })
    }

    fn matches(&self, value: &str, now: DateTime<Utc>) -> bool {
        match self {
            Matcher::Exact(expected) => value == expected,
            Matcher::Contains(needle) => value.contains(needle.as_str()),
            Matcher::Glob(pattern) => pattern.matches(value),
            Matcher::Regex(regex) => regex.is_match(value),
            Matcher::OlderThan(age) => DateTime::parse_from_rfc3339(value)
                .map(|created| now.signed_duration_since(created) > *age)
                .unwrap_or(false),
        }
    }
}

/// Parse ages like `90s`, `12h`, `30d`, `2w` or `1month 2days`.
fn parse_age(value: &str) -> Result<chrono::Duration, String> {
    let age = humantime::parse_duration(value.trim())
        .map_err(|e| format!("invalid age '{value}': {e}"))?;
    chrono::Duration::from_std(age).map_err(|_| format!("age '{value}' is out of range"))
}

#[derive(Debug)]
struct CompiledRule {
    number: usize,
    action: RuleAction,
    /// Canonical type names; empty applies to every type.
    types: HashSet<String>,
    target: RuleTarget,
    kind: MatchKind,
    value: String,
    matcher: Matcher,
    invert: bool,
}

impl CompiledRule {
    fn applies_to(&self, type_name: &str) -> bool {
        self.types.is_empty() || self.types.contains(type_name)
    }

    fn matches(&self, identity: &str, properties: &Properties, now: DateTime<Utc>) -> bool {
        let value = self.target.value(identity, properties);
        self.matcher.matches(value, now) != self.invert
    }

    fn describe(&self) -> String {
        let action = match self.action {
            RuleAction::Keep => "keep",
            RuleAction::Remove => "remove",
        };
        let negation = if self.invert { "not " } else { "" };
        format!(
            "{action} rule #{} matched: {} {negation}{:?} \"{}\"",
            self.number, self.target, self.kind, self.value
        )
    }
}

/// Classifies scanned resources as REMOVE or SKIP.
///
/// Rules are evaluated in order and the first match wins; a resource no rule
/// matches is removed. The clock used by date rules is fixed at construction,
/// so repeated classification of the same input gives the same result.
#[derive(Debug)]
pub struct FilterEngine {
    rules: Vec<CompiledRule>,
    now: DateTime<Utc>,
}

impl FilterEngine {
    /// Compile rules against the registry, using the current time.
    pub fn new(
        rules: &[FilterRuleConfig],
        registry: &ResourceTypeRegistry,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(rules, registry, Utc::now())
    }

    /// Compile rules with an explicit evaluation time.
    pub fn with_clock(
        rules: &[FilterRuleConfig],
        registry: &ResourceTypeRegistry,
        now: DateTime<Utc>,
    ) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| Self::compile_rule(i + 1, rule, registry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules, now })
    }

    /// An engine without configured rules.
    pub fn permissive() -> Self {
        Self {
            rules: Vec::new(),
            now: Utc::now(),
        }
    }

    fn compile_rule(
        number: usize,
        rule: &FilterRuleConfig,
        registry: &ResourceTypeRegistry,
    ) -> Result<CompiledRule, ConfigError> {
        let types = registry.canonical_names(&rule.types)?.into_iter().collect();

        let target = match (&rule.property, &rule.tag) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(format!(
                    "filter rule #{number} sets both property and tag"
                )))
            }
            (Some(property), None) => RuleTarget::Property(property.clone()),
            (None, Some(tag)) => RuleTarget::Property(format!("{TAG_PREFIX}:{tag}")),
            (None, None) => RuleTarget::Identity,
        };

        let matcher = Matcher::compile(rule.match_kind, &rule.value).map_err(|e| {
            ConfigError::Invalid(format!("filter rule #{number}: {e}"))
        })?;

        Ok(CompiledRule {
            number,
            action: rule.action,
            types,
            target,
            kind: rule.match_kind,
            value: rule.value.clone(),
            matcher,
            invert: rule.invert,
        })
    }

    /// Number of compiled rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify one resource.
    pub fn classify(&self, resource: &ScannedResource) -> Classification {
        let handle = &resource.handle;

        match panic::catch_unwind(AssertUnwindSafe(|| handle.filter())) {
            Ok(Ok(())) => {}
            Ok(Err(keep)) => {
                return Classification::Skip {
                    reason: SkipReason::Filtered(keep.0),
                }
            }
            Err(payload) => {
                return Classification::Skip {
                    reason: SkipReason::Filtered(format!(
                        "filter panicked: {}",
                        panic_message(payload.as_ref())
                    )),
                }
            }
        }

        let identity = handle.identity();
        let properties = handle.properties();

        let matched = self.rules.iter().find(|rule| {
            rule.applies_to(&resource.type_name) && rule.matches(&identity, &properties, self.now)
        });

        match matched {
            Some(rule) if rule.action == RuleAction::Keep => Classification::Skip {
                reason: SkipReason::Rule(rule.describe()),
            },
            Some(rule) => Classification::Remove {
                reason: rule.describe(),
            },
            None => Classification::Remove {
                reason: "no matching rule".to_string(),
            },
        }
    }
}
