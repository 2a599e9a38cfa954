//! Field constraints: the `field|modifier: expected` entries of a selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::evaluator::field::split_modifier;

/// Comparison mode selected by a `|modifier` suffix on the field path.
///
/// All modifiers compare case-insensitively against the stringified value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Contains,
    StartsWith,
    EndsWith,
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Contains => write!(f, "contains"),
            Modifier::StartsWith => write!(f, "startswith"),
            Modifier::EndsWith => write!(f, "endswith"),
        }
    }
}

impl FromStr for Modifier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "contains" => Ok(Modifier::Contains),
            "startswith" => Ok(Modifier::StartsWith),
            "endswith" => Ok(Modifier::EndsWith),
            other => Err(format!("unsupported field modifier '{}'", other)),
        }
    }
}

/// One expected value. Classified once at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Pattern {
    /// Exact text.
    Literal(String),
    /// Text containing `*` (any run) or `?` (one character).
    Glob(String),
}

impl Pattern {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.contains(['*', '?']) {
            Pattern::Glob(text)
        } else {
            Pattern::Literal(text)
        }
    }

    /// The raw pattern text as written in the rule.
    pub fn text(&self) -> &str {
        match self {
            Pattern::Literal(s) | Pattern::Glob(s) => s,
        }
    }
}

/// Expected value shape for a single field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedValue {
    Single(Pattern),
    /// Matches when any entry matches.
    List(Vec<Pattern>),
}

impl ExpectedValue {
    pub fn patterns(&self) -> &[Pattern] {
        match self {
            ExpectedValue::Single(p) => std::slice::from_ref(p),
            ExpectedValue::List(items) => items,
        }
    }
}

/// A single `path|modifier: expected` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConstraint {
    /// Dotted field path with the modifier stripped.
    pub path: String,
    pub modifier: Option<Modifier>,
    pub expected: ExpectedValue,
}

impl FieldConstraint {
    /// Build a constraint from a raw selection key such as
    /// `CommandLine|contains`.
    pub fn parse(key: &str, expected: ExpectedValue) -> std::result::Result<Self, String> {
        let (path, modifier) = split_modifier(key);
        let modifier = match modifier {
            Some(m) if m.contains('|') => {
                return Err(format!(
                    "field '{}': chained modifiers are not supported",
                    key
                ));
            }
            Some(m) => Some(
                m.parse::<Modifier>()
                    .map_err(|e| format!("field '{}': {}", key, e))?,
            ),
            None => None,
        };
        if path.is_empty() {
            return Err(format!("field '{}': empty field path", key));
        }
        Ok(Self {
            path: path.to_string(),
            modifier,
            expected,
        })
    }
}

/// A named conjunctive group of field constraints.
///
/// Constraint order follows the rule file. Evaluation short-circuits on the
/// first failing constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub name: String,
    pub constraints: Vec<FieldConstraint>,
}
