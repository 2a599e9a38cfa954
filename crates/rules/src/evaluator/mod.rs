//! Rule evaluation over individual event records.
//!
//! A rule's selections are combined according to its [`Condition`]:
//! `AllOf` requires every selection, `AnyOf` at least one. A rule without
//! selections never matches, whatever its condition says.

pub mod field;
pub mod glob;
pub mod selection;

use serde_json::Value;

use crate::schema::{Condition, MatchResult, Rule};

pub use field::{lookup, resolve, split_modifier, stringify};
pub use glob::glob_match;
pub use selection::{matches_constraint, matches_selection};

// ── Rule evaluator ──────────────────────────────────────────────────

/// Stateless evaluator. Rules are independent; evaluating one never
/// affects another.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Whether a single rule matches a single record.
    pub fn matches(rule: &Rule, record: &Value) -> bool {
        if rule.selections.is_empty() {
            return false;
        }
        match rule.condition {
            Condition::AllOf => rule.selections.iter().all(|s| matches_selection(record, s)),
            Condition::AnyOf => rule.selections.iter().any(|s| matches_selection(record, s)),
        }
    }

    /// Test one record against every rule, returning a match per firing rule.
    pub fn evaluate(rules: &[Rule], record: &Value) -> Vec<MatchResult> {
        rules
            .iter()
            .filter(|rule| Self::matches(rule, record))
            .map(|rule| MatchResult::new(rule, record))
            .collect()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::schema::{ExpectedValue, FieldConstraint, Pattern, Selection};
    use serde_json::json;

    fn sel(name: &str, key: &str, values: &[&str]) -> Selection {
        let expected = if values.len() == 1 {
            ExpectedValue::Single(Pattern::new(values[0]))
        } else {
            ExpectedValue::List(values.iter().map(|v| Pattern::new(*v)).collect())
        };
        Selection {
            name: name.to_string(),
            constraints: vec![FieldConstraint::parse(key, expected).unwrap()],
        }
    }

    fn rule(title: &str, condition: Condition, selections: Vec<Selection>) -> Rule {
        Rule {
            title: title.to_string(),
            source: PathBuf::from(format!("{}.yml", title)),
            condition_text: String::new(),
            condition,
            selections,
        }
    }

    #[test]
    fn zero_selections_never_match() {
        for condition in [Condition::AllOf, Condition::AnyOf] {
            let r = rule("empty", condition, vec![]);
            assert!(!RuleEvaluator::matches(&r, &json!({})));
            assert!(!RuleEvaluator::matches(&r, &json!({"EventID": "4625"})));
        }
    }

    #[test]
    fn all_of_requires_every_selection() {
        let r = rule(
            "rdp-failure",
            Condition::AllOf,
            vec![sel("s1", "EventID", &["4625"]), sel("s2", "LogonType", &["10"])],
        );
        assert!(RuleEvaluator::matches(&r, &json!({"EventID": "4625", "LogonType": "10"})));
        assert!(!RuleEvaluator::matches(&r, &json!({"EventID": "4625", "LogonType": "2"})));
    }

    #[test]
    fn any_of_requires_one_selection() {
        let r = rule(
            "either",
            Condition::AnyOf,
            vec![sel("s1", "EventID", &["4625"]), sel("s2", "LogonType", &["10"])],
        );
        assert!(RuleEvaluator::matches(&r, &json!({"EventID": "1", "LogonType": "10"})));
        assert!(RuleEvaluator::matches(&r, &json!({"EventID": "4625"})));
        assert!(!RuleEvaluator::matches(&r, &json!({"EventID": "1"})));
    }

    #[test]
    fn evaluate_reports_each_matching_rule() {
        let rules = vec![
            rule("logon-failure", Condition::AllOf, vec![sel("s", "EventID", &["4625"])]),
            rule("any-logon", Condition::AllOf, vec![sel("s", "EventID", &["4624", "4625"])]),
            rule("never", Condition::AllOf, vec![]),
        ];
        let record = json!({"EventID": "4625"});
        let matches = RuleEvaluator::evaluate(&rules, &record);
        let titles: Vec<&str> = matches.iter().map(|m| m.rule.as_str()).collect();
        assert_eq!(titles, vec!["logon-failure", "any-logon"]);
        assert_eq!(matches[0].rule_path, PathBuf::from("logon-failure.yml"));
        assert_eq!(matches[0].event, record);
    }
}
