//! Visibility / activation expressions.
//!
//! Stored as loosely-shaped JSON, parsed once into [`Condition`] when a form
//! version is loaded. Malformed shapes are rejected at parse time; unknown
//! operators are kept and evaluate to `false`.

use std::fmt;

use formflow_interchange::Id;
use serde_json::{Map, Value};

use crate::numeric::{is_empty, loose_cmp, loose_eq, to_text};
use crate::types::ValueMap;

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Filled,
    Empty,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Unknown(String),
}

impl Operator {
    pub fn parse(s: &str) -> Operator {
        match s {
            "filled" => Operator::Filled,
            "empty" => Operator::Empty,
            "equals" => Operator::Equals,
            "not_equals" => Operator::NotEquals,
            "greater_than" => Operator::GreaterThan,
            "less_than" => Operator::LessThan,
            "greater_or_equal" => Operator::GreaterOrEqual,
            "less_or_equal" => Operator::LessOrEqual,
            "contains" => Operator::Contains,
            "not_contains" => Operator::NotContains,
            "starts_with" => Operator::StartsWith,
            "ends_with" => Operator::EndsWith,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            other => Operator::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

/// A parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Placeholder for an empty sub-expression; always true.
    Always,
    Leaf {
        /// `None` when the stored leaf names no field; such leaves are false.
        field_id: Option<Id>,
        operator: Operator,
        value: Value,
    },
    Branch {
        logic: Logic,
        conditions: Vec<Condition>,
    },
}

/// A stored expression that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionError {
    pub message: String,
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid condition: {}", self.message)
    }
}

impl std::error::Error for ConditionError {}

fn malformed(message: impl Into<String>) -> ConditionError {
    ConditionError {
        message: message.into(),
    }
}

/// Parse a stored expression. Null, empty objects/arrays and blank strings
/// mean "no condition" and yield `Ok(None)`. A string holding JSON text is
/// decoded first.
pub fn parse_condition(raw: &Value) -> Result<Option<Condition>, ConditionError> {
    match raw {
        Value::Null => Ok(None),
        Value::Bool(false) => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => {
            let decoded: Value = serde_json::from_str(s)
                .map_err(|e| malformed(format!("condition text is not JSON: {e}")))?;
            if decoded.is_string() {
                return Err(malformed("condition text decodes to a string"));
            }
            parse_condition(&decoded)
        }
        Value::Array(a) if a.is_empty() => Ok(None),
        Value::Object(o) if o.is_empty() => Ok(None),
        Value::Object(o) => parse_node(o).map(Some),
        other => Err(malformed(format!("expected an object, got {other}"))),
    }
}

fn parse_node(obj: &Map<String, Value>) -> Result<Condition, ConditionError> {
    if let Some(logic) = obj.get("logic") {
        let logic = match logic.as_str().map(|s| s.to_ascii_lowercase()) {
            Some(l) if l == "and" => Logic::And,
            Some(l) if l == "or" => Logic::Or,
            _ => return Err(malformed(format!("unknown logic {logic}"))),
        };
        let children = match obj.get("conditions") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Condition::Branch { logic, conditions: vec![] }),
            Some(other) => return Err(malformed(format!("conditions must be a list, got {other}"))),
        };
        let conditions = children
            .iter()
            .map(|c| parse_condition(c).map(|c| c.unwrap_or(Condition::Always)))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Condition::Branch { logic, conditions });
    }

    let field_id = match obj.get("field_id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => None,
            Some(id) => Some(id),
            None => return Err(malformed(format!("field_id must be an integer, got {n}"))),
        },
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(
            s.trim()
                .parse::<Id>()
                .map_err(|_| malformed(format!("field_id must be an integer, got \"{s}\"")))?,
        ),
        Some(other) => return Err(malformed(format!("field_id must be an integer, got {other}"))),
    };
    let operator = match obj.get("operator") {
        None | Some(Value::Null) => Operator::Filled,
        Some(Value::String(s)) => Operator::parse(s),
        Some(other) => return Err(malformed(format!("operator must be a string, got {other}"))),
    };
    let value = obj.get("value").cloned().unwrap_or(Value::Null);
    Ok(Condition::Leaf {
        field_id,
        operator,
        value,
    })
}

impl Condition {
    /// Evaluate against a value map. Leaves whose field is absent (or null)
    /// are false.
    pub fn evaluate(&self, values: &ValueMap) -> bool {
        match self {
            Condition::Always => true,
            Condition::Branch { logic, conditions } => match logic {
                Logic::And => conditions.iter().all(|c| c.evaluate(values)),
                Logic::Or => conditions.iter().any(|c| c.evaluate(values)),
            },
            Condition::Leaf {
                field_id,
                operator,
                value,
            } => {
                let Some(actual) = field_id.and_then(|id| values.get(&id)) else {
                    return false;
                };
                if actual.is_null() {
                    return false;
                }
                apply_operator(operator, actual, value)
            }
        }
    }

    /// Field ids referenced anywhere in the tree.
    pub fn field_ids(&self) -> Vec<Id> {
        let mut out = Vec::new();
        self.collect_field_ids(&mut out);
        out
    }

    fn collect_field_ids(&self, out: &mut Vec<Id>) {
        match self {
            Condition::Always => {}
            Condition::Leaf { field_id, .. } => out.extend(field_id.iter().copied()),
            Condition::Branch { conditions, .. } => {
                for c in conditions {
                    c.collect_field_ids(out);
                }
            }
        }
    }
}

/// `None` (no condition) is true.
pub fn evaluate(condition: Option<&Condition>, values: &ValueMap) -> bool {
    condition.map_or(true, |c| c.evaluate(values))
}

fn apply_operator(op: &Operator, actual: &Value, expected: &Value) -> bool {
    use std::cmp::Ordering;

    match op {
        Operator::Filled => !is_empty(actual),
        Operator::Empty => is_empty(actual),
        Operator::Equals => loose_eq(actual, expected),
        Operator::NotEquals => !loose_eq(actual, expected),
        Operator::GreaterThan => loose_cmp(actual, expected) == Ordering::Greater,
        Operator::LessThan => loose_cmp(actual, expected) == Ordering::Less,
        Operator::GreaterOrEqual => loose_cmp(actual, expected) != Ordering::Less,
        Operator::LessOrEqual => loose_cmp(actual, expected) != Ordering::Greater,
        Operator::Contains => to_text(actual).contains(&to_text(expected)),
        Operator::NotContains => !to_text(actual).contains(&to_text(expected)),
        Operator::StartsWith => to_text(actual).starts_with(&to_text(expected)),
        Operator::EndsWith => to_text(actual).ends_with(&to_text(expected)),
        Operator::In => as_list(expected).iter().any(|e| loose_eq(actual, e)),
        Operator::NotIn => !as_list(expected).iter().any(|e| loose_eq(actual, e)),
        Operator::Unknown(_) => false,
    }
}

fn as_list(v: &Value) -> Vec<Value> {
    match v {
        Value::Null => vec![],
        Value::Array(items) => items.clone(),
        Value::Object(o) => o.values().cloned().collect(),
        scalar => vec![scalar.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(Id, Value)]) -> ValueMap {
        pairs.iter().cloned().collect()
    }

    fn cond(raw: Value) -> Condition {
        parse_condition(&raw).unwrap().unwrap()
    }

    #[test]
    fn empty_expressions_are_no_condition() {
        for raw in [json!(null), json!({}), json!([]), json!(""), json!("  ")] {
            assert_eq!(parse_condition(&raw).unwrap(), None, "{raw}");
        }
        assert!(evaluate(None, &ValueMap::new()));
    }

    #[test]
    fn operator_defaults_to_filled() {
        let c = cond(json!({"field_id": 1}));
        assert!(c.evaluate(&values(&[(1, json!("x"))])));
        assert!(!c.evaluate(&values(&[(1, json!(""))])));
    }

    #[test]
    fn missing_field_is_false_for_every_operator() {
        for op in ["filled", "empty", "equals", "not_equals", "not_in", "not_contains"] {
            let c = cond(json!({"field_id": 9, "operator": op, "value": "x"}));
            assert!(!c.evaluate(&ValueMap::new()), "{op}");
        }
    }

    #[test]
    fn equality_is_loose() {
        let c = cond(json!({"field_id": "1", "operator": "equals", "value": 5}));
        assert!(c.evaluate(&values(&[(1, json!("5"))])));
        let c = cond(json!({"field_id": 1, "operator": "not_equals", "value": "yes"}));
        assert!(c.evaluate(&values(&[(1, json!("no"))])));
    }

    #[test]
    fn ordering_and_substring_operators() {
        let v = values(&[(1, json!("12")), (2, json!("hello world"))]);
        assert!(cond(json!({"field_id": 1, "operator": "greater_than", "value": "9"})).evaluate(&v));
        assert!(cond(json!({"field_id": 1, "operator": "less_or_equal", "value": 12})).evaluate(&v));
        assert!(cond(json!({"field_id": 2, "operator": "contains", "value": "lo w"})).evaluate(&v));
        assert!(cond(json!({"field_id": 2, "operator": "starts_with", "value": "hell"})).evaluate(&v));
        assert!(cond(json!({"field_id": 2, "operator": "ends_with", "value": "world"})).evaluate(&v));
        assert!(!cond(json!({"field_id": 2, "operator": "not_contains", "value": "world"})).evaluate(&v));
    }

    #[test]
    fn membership_operators() {
        let v = values(&[(1, json!("b"))]);
        assert!(cond(json!({"field_id": 1, "operator": "in", "value": ["a", "b"]})).evaluate(&v));
        assert!(cond(json!({"field_id": 1, "operator": "not_in", "value": ["x"]})).evaluate(&v));
        assert!(cond(json!({"field_id": 1, "operator": "in", "value": "b"})).evaluate(&v));
    }

    #[test]
    fn unknown_operator_is_false() {
        let c = cond(json!({"field_id": 1, "operator": "resembles", "value": "x"}));
        assert!(matches!(c, Condition::Leaf { operator: Operator::Unknown(_), .. }));
        assert!(!c.evaluate(&values(&[(1, json!("x"))])));
    }

    #[test]
    fn branches_combine() {
        let v = values(&[(1, json!("yes")), (2, json!(""))]);
        let and = cond(json!({"logic": "and", "conditions": [
            {"field_id": 1, "operator": "equals", "value": "yes"},
            {"field_id": 2, "operator": "filled"}
        ]}));
        let or = cond(json!({"logic": "or", "conditions": [
            {"field_id": 1, "operator": "equals", "value": "yes"},
            {"field_id": 2, "operator": "filled"}
        ]}));
        assert!(!and.evaluate(&v));
        assert!(or.evaluate(&v));
    }

    #[test]
    fn nested_empty_child_is_true() {
        let c = cond(json!({"logic": "and", "conditions": [{}, {"field_id": 1}]}));
        assert!(c.evaluate(&values(&[(1, json!("x"))])));
    }

    #[test]
    fn json_text_is_decoded() {
        let c = cond(json!("{\"field_id\": 1, \"operator\": \"empty\"}"));
        assert!(c.evaluate(&values(&[(1, json!(""))])));
    }

    #[test]
    fn malformed_shapes_rejected() {
        assert!(parse_condition(&json!(5)).is_err());
        assert!(parse_condition(&json!([1, 2])).is_err());
        assert!(parse_condition(&json!({"logic": "xor", "conditions": []})).is_err());
        assert!(parse_condition(&json!({"logic": "and", "conditions": 3})).is_err());
        assert!(parse_condition(&json!({"field_id": {"a": 1}})).is_err());
        assert!(parse_condition(&json!({"field_id": 1, "operator": 7})).is_err());
        assert!(parse_condition(&json!("not json")).is_err());
    }

    #[test]
    fn evaluation_is_total_on_empty_values() {
        let c = cond(json!({"logic": "or", "conditions": [
            {"field_id": 1, "operator": "greater_than", "value": 3},
            {"logic": "and", "conditions": [{"field_id": 2, "operator": "in", "value": null}]}
        ]}));
        assert!(!c.evaluate(&ValueMap::new()));
        assert_eq!(c.field_ids(), vec![1, 2]);
    }
}
