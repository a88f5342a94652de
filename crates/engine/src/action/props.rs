//! Readers for the loosely typed action parameter bag.

use std::collections::BTreeMap;

use formflow_interchange::Id;
use serde_json::{Map, Value};

/// A scalar prop as text; `None` when absent or null.
pub(super) fn string(props: &Map<String, Value>, key: &str) -> Option<String> {
    match props.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// A list of strings. A bare string counts as a one-element list.
pub(super) fn string_list(props: &Map<String, Value>, key: &str) -> Vec<String> {
    match props.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => vec![],
    }
}

/// A list of ids, from numbers or numeric strings.
pub(super) fn id_list(props: &Map<String, Value>, key: &str) -> Vec<Id> {
    let as_id = |v: &Value| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match props.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(as_id).collect(),
        Some(v) => as_id(v).into_iter().collect(),
        None => vec![],
    }
}

/// An object of string values; non-string values use their JSON text.
pub(super) fn string_map(props: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = props.get(key) else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect()
}

/// A positive number of seconds.
pub(super) fn seconds(props: &Map<String, Value>, key: &str) -> Option<f64> {
    let secs = match props.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn lenient_readers() {
        let p = props(json!({
            "a": "x", "n": 3, "list": ["a", 2, null], "one": "solo",
            "ids": [1, "2", "x"], "id": "4", "h": {"k": "v", "n": 1},
            "t": "2.5", "neg": -1
        }));
        assert_eq!(string(&p, "n").as_deref(), Some("3"));
        assert_eq!(string(&p, "missing"), None);
        assert_eq!(string_list(&p, "list"), vec!["a", "2"]);
        assert_eq!(string_list(&p, "one"), vec!["solo"]);
        assert_eq!(id_list(&p, "ids"), vec![1, 2]);
        assert_eq!(id_list(&p, "id"), vec![4]);
        assert_eq!(string_map(&p, "h")["n"], "1");
        assert_eq!(seconds(&p, "t"), Some(2.5));
        assert_eq!(seconds(&p, "neg"), None);
    }
}
