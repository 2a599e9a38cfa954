//! Dotted-path field addressing over semi-structured records.

use serde_json::Value;

/// Split `a.b.c|modifier` into the path and the optional modifier text.
pub fn split_modifier(key: &str) -> (&str, Option<&str>) {
    match key.split_once('|') {
        Some((path, modifier)) => (path, Some(modifier)),
        None => (key, None),
    }
}

/// Resolve a field key against a record.
///
/// The modifier is stripped and handed back separately; the path is walked
/// one segment at a time through nested objects. A missing segment or a
/// non-object container along the way resolves to `None`.
pub fn resolve<'r, 'k>(record: &'r Value, key: &'k str) -> (Option<&'r Value>, Option<&'k str>) {
    let (path, modifier) = split_modifier(key);
    (lookup(record, path), modifier)
}

/// Walk a modifier-free dotted path.
pub fn lookup<'r>(record: &'r Value, path: &str) -> Option<&'r Value> {
    path.split('.')
        .try_fold(record, |current, segment| current.as_object()?.get(segment))
}

/// Render a resolved value the way constraints compare it.
///
/// Strings are taken verbatim, scalars use their display form and
/// containers are rendered as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
