//! Normalization of a parsed rule document into a [`Rule`].

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::schema::{Condition, ExpectedValue, FieldConstraint, Pattern, Rule, Selection};

use super::error::{Result, RuleError};

const CONDITION_KEY: &str = "condition";

/// Build a [`Rule`] from a YAML document.
///
/// Selections are the `detection` entries whose value is a mapping, kept in
/// file order. Other non-`condition` entries (keyword lists, timeframes) are
/// ignored.
pub fn rule_from_yaml(doc: &Value, source: &Path) -> Result<Rule> {
    let root = doc
        .as_mapping()
        .ok_or_else(|| RuleError::Validation("rule root must be a mapping".to_string()))?;

    let title = match root.get("title") {
        Some(Value::String(t)) if !t.trim().is_empty() => t.clone(),
        _ => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string()),
    };

    let detection = match root.get("detection") {
        Some(Value::Mapping(m)) => m,
        Some(_) => {
            return Err(RuleError::Validation(
                "detection block must be a mapping".to_string(),
            ))
        }
        None => return Err(RuleError::Validation("missing detection block".to_string())),
    };

    let condition_text = match detection.get(CONDITION_KEY) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(RuleError::Validation(
                "condition must be a single string".to_string(),
            ))
        }
    };
    let condition: Condition = condition_text.parse().map_err(RuleError::Validation)?;

    let mut selections = Vec::new();
    for (key, value) in detection {
        let name = match key {
            Value::String(s) => s.as_str(),
            other => {
                return Err(RuleError::Validation(format!(
                    "detection key must be a string, got {:?}",
                    other
                )))
            }
        };
        if name == CONDITION_KEY {
            continue;
        }
        match value {
            Value::Mapping(fields) => selections.push(selection_from_mapping(name, fields)?),
            _ => debug!(selection = %name, path = %source.display(), "ignoring non-mapping detection entry"),
        }
    }

    Ok(Rule {
        title,
        source: source.to_path_buf(),
        condition_text,
        condition,
        selections,
    })
}

fn selection_from_mapping(name: &str, fields: &Mapping) -> Result<Selection> {
    let mut constraints = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        let key = key.as_str().ok_or_else(|| {
            RuleError::Validation(format!("selection '{}': field names must be strings", name))
        })?;
        let expected = expected_from_yaml(value)
            .map_err(|e| RuleError::Validation(format!("selection '{}', field '{}': {}", name, key, e)))?;
        let constraint = FieldConstraint::parse(key, expected)
            .map_err(|e| RuleError::Validation(format!("selection '{}': {}", name, e)))?;
        constraints.push(constraint);
    }
    Ok(Selection {
        name: name.to_string(),
        constraints,
    })
}

fn expected_from_yaml(value: &Value) -> std::result::Result<ExpectedValue, String> {
    match value {
        Value::Sequence(items) => items
            .iter()
            .map(|item| scalar_text(item).map(Pattern::new))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(ExpectedValue::List),
        other => scalar_text(other).map(|t| ExpectedValue::Single(Pattern::new(t))),
    }
}

/// Stringify a YAML scalar the same way event values are stringified, so
/// `EventID: 4625` in a rule matches `"EventID": 4625` in an event.
fn scalar_text(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            Err("expected values must be scalars or a list of scalars".to_string())
        }
    }
}
