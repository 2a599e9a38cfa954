//! Rule condition: how a rule's selections combine into a verdict.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Selection combinator, resolved once when the rule is loaded.
///
/// Only the quantifier is recognized. Conditions that would need a real
/// boolean grammar (negation, grouping, `N of` with N > 1, mixed `and`/`or`)
/// are rejected at load time instead of being evaluated wrongly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Every selection must hold.
    #[default]
    AllOf,
    /// At least one selection must hold.
    AnyOf,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::AllOf => write!(f, "all_of"),
            Condition::AnyOf => write!(f, "any_of"),
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    /// Accepted forms:
    ///
    /// - empty, `all of <x>`, `<a>`, `<a> and <b> ...` → [`Condition::AllOf`]
    /// - `1 of <x>`, `any of <x>`, `<a> or <b> ...` → [`Condition::AnyOf`]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Ok(Condition::AllOf);
        }
        if text.contains(['(', ')', '|']) {
            return Err(format!("unsupported condition '{}': grouping and pipes are not supported", text));
        }

        let tokens: Vec<String> = text.split_whitespace().map(|t| t.to_lowercase()).collect();
        if tokens.iter().any(|t| t == "not") {
            return Err(format!("unsupported condition '{}': negation is not supported", text));
        }

        // Quantifier form: `<q> of <target>`.
        if tokens.len() >= 2 && tokens[1] == "of" {
            if tokens.len() != 3 {
                return Err(format!("unsupported condition '{}': quantifiers cannot be combined", text));
            }
            return match tokens[0].as_str() {
                "all" => Ok(Condition::AllOf),
                "any" | "1" => Ok(Condition::AnyOf),
                q if q.parse::<u32>().is_ok() => Err(format!(
                    "unsupported condition '{}': numeric quantifier '{}' is not supported",
                    text, q
                )),
                q => Err(format!("unsupported condition '{}': unknown quantifier '{}'", text, q)),
            };
        }

        // Name list joined by a single operator: `a`, `a and b`, `a or b or c`.
        let mut operator: Option<&str> = None;
        for (i, token) in tokens.iter().enumerate() {
            let expects_name = i % 2 == 0;
            let is_operator = token == "and" || token == "or";
            if expects_name == is_operator || token == "of" {
                return Err(format!("unsupported condition '{}': unexpected token '{}'", text, token));
            }
            if is_operator {
                match operator {
                    Some(op) if op != token => {
                        return Err(format!(
                            "unsupported condition '{}': mixed 'and'/'or' needs grouping",
                            text
                        ));
                    }
                    _ => operator = Some(token.as_str()),
                }
            }
        }
        if tokens.len() % 2 == 0 {
            return Err(format!("unsupported condition '{}': dangling operator", text));
        }

        match operator {
            Some("or") => Ok(Condition::AnyOf),
            _ => Ok(Condition::AllOf),
        }
    }
}
