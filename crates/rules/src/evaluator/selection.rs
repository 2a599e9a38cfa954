//! Selection matching: one named constraint group against one record.

use serde_json::Value;

use crate::schema::{FieldConstraint, Modifier, Pattern, Selection};

use super::field::{lookup, stringify};
use super::glob::glob_match;

/// True iff every constraint of the selection holds for the record.
pub fn matches_selection(record: &Value, selection: &Selection) -> bool {
    selection
        .constraints
        .iter()
        .all(|constraint| matches_constraint(record, constraint))
}

/// Evaluate a single constraint. An absent field never matches.
pub fn matches_constraint(record: &Value, constraint: &FieldConstraint) -> bool {
    let value = match lookup(record, &constraint.path) {
        Some(v) => v,
        None => return false,
    };
    let actual = stringify(value);

    match constraint.modifier {
        Some(modifier) => {
            let actual = actual.to_lowercase();
            constraint
                .expected
                .patterns()
                .iter()
                .any(|p| matches_modified(&actual, p.text(), modifier))
        }
        None => constraint
            .expected
            .patterns()
            .iter()
            .any(|p| matches_pattern(&actual, p)),
    }
}

fn matches_pattern(actual: &str, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Literal(expected) => actual == expected,
        Pattern::Glob(glob) => glob_match(glob, actual),
    }
}

/// `actual` is already lower-cased.
fn matches_modified(actual: &str, expected: &str, modifier: Modifier) -> bool {
    let expected = expected.to_lowercase();
    match modifier {
        Modifier::Contains => actual.contains(&expected),
        Modifier::StartsWith => actual.starts_with(&expected),
        Modifier::EndsWith => actual.ends_with(&expected),
    }
}
