//! Loaded detection rules and the match records they produce.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Condition, Selection};

/// A detection rule, normalized from one rule file. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub title: String,
    /// File the rule was loaded from.
    pub source: PathBuf,
    /// Condition text as written, kept for reporting.
    pub condition_text: String,
    pub condition: Condition,
    pub selections: Vec<Selection>,
}

impl Rule {
    pub fn selection(&self, name: &str) -> Option<&Selection> {
        self.selections.iter().find(|s| s.name == name)
    }
}

/// One rule firing on one event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Title of the rule that matched.
    pub rule: String,
    pub rule_path: PathBuf,
    pub event: Value,
}

impl MatchResult {
    pub fn new(rule: &Rule, event: &Value) -> Self {
        Self {
            rule: rule.title.clone(),
            rule_path: rule.source.clone(),
            event: event.clone(),
        }
    }
}
