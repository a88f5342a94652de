//! Deserialization from stored form-version JSON into typed structs.
//!
//! The main entry point is [`from_interchange`], which takes a
//! `&serde_json::Value` and produces a [`FormVersionDoc`].
//!
//! Stored documents come from more than one writer, so the parser is
//! lenient about representation and strict about structure:
//! - keys are accepted in `snake_case` and in the `camelCase` form
//!   (`is_initial` / `isInitial`, `rule_props` / `ruleProps`, ...)
//! - ids may be JSON numbers or numeric strings
//! - columns that older writers stored as JSON text (conditions, props,
//!   id allowlists) are decoded transparently
//! - missing ids, a missing field type, or a missing stage list are errors

use crate::types::*;
use serde_json::Value;
use std::fmt;

/// Errors during form document deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// The document is missing a required top-level field.
    MissingField { field: String },
    /// A nested element (stage, section, field, ...) is malformed.
    ConstructError {
        kind: String,
        id: String,
        message: String,
    },
    /// The document structure is invalid.
    InvalidDocument(String),
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MissingField { field } => {
                write!(f, "document missing required field: '{}'", field)
            }
            InterchangeError::ConstructError { kind, id, message } => {
                write!(f, "{} '{}': {}", kind, id, message)
            }
            InterchangeError::InvalidDocument(msg) => {
                write!(f, "invalid document: {}", msg)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Deserialize a stored form-version document into typed structs.
pub fn from_interchange(doc: &Value) -> Result<FormVersionDoc, InterchangeError> {
    if !doc.is_object() {
        return Err(InterchangeError::InvalidDocument(
            "form version must be a JSON object".to_string(),
        ));
    }

    let id = lookup_id(doc, &["id"]).ok_or_else(|| InterchangeError::MissingField {
        field: "id".to_string(),
    })?;
    let form_id = lookup_id(doc, &["form_id", "formId"]).unwrap_or(0);
    let form_name = lookup_str(doc, &["form_name", "formName", "name"]).unwrap_or_default();
    let version_number = lookup_id(doc, &["version_number", "versionNumber"]).unwrap_or(0);

    let status = match lookup_str(doc, &["status"]) {
        None => VersionStatus::Draft,
        Some(s) => VersionStatus::parse(&s).ok_or_else(|| {
            InterchangeError::InvalidDocument(format!("unknown version status '{}'", s))
        })?,
    };

    let stages_arr = lookup(doc, &["stages"])
        .and_then(|v| v.as_array())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "stages".to_string(),
        })?;
    let stages = stages_arr
        .iter()
        .map(parse_stage)
        .collect::<Result<Vec<_>, _>>()?;

    let transitions = match lookup(doc, &["transitions", "stage_transitions", "stageTransitions"])
    {
        Some(Value::Array(arr)) => arr
            .iter()
            .map(parse_transition)
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(InterchangeError::InvalidDocument(
                "'transitions' must be an array".to_string(),
            ))
        }
        None => Vec::new(),
    };

    Ok(FormVersionDoc {
        id,
        form_id,
        form_name,
        version_number,
        status,
        stages,
        transitions,
    })
}

/// Serialize a document back to its canonical (`snake_case`) JSON form.
pub fn to_interchange(doc: &FormVersionDoc) -> Value {
    serde_json::to_value(doc).unwrap_or(Value::Null)
}

// ── Parsing helpers ─────────────────────────────────────────────────

/// First non-null value among the given key spellings.
fn lookup<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn lookup_str(obj: &Value, keys: &[&str]) -> Option<String> {
    match lookup(obj, keys)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn as_id(v: &Value) -> Option<Id> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lookup_id(obj: &Value, keys: &[&str]) -> Option<Id> {
    lookup(obj, keys).and_then(as_id)
}

fn lookup_bool(obj: &Value, keys: &[&str]) -> bool {
    match lookup(obj, keys) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "yes" | "on"),
        _ => false,
    }
}

/// Decode a column that may hold JSON text. Null and empty strings become
/// `None`; strings that parse as a JSON object or array are decoded.
fn embedded(v: Option<&Value>) -> Option<Value> {
    match v? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Some(parsed),
            Ok(Value::Null) => None,
            _ => Some(Value::String(s.clone())),
        },
        other => Some(other.clone()),
    }
}

/// Decode a parameter bag into a JSON object (anything else becomes `{}`).
fn props_object(v: Option<&Value>) -> Value {
    match embedded(v) {
        Some(obj @ Value::Object(_)) => obj,
        _ => Value::Object(serde_json::Map::new()),
    }
}

fn id_list(v: Option<&Value>) -> Vec<Id> {
    match embedded(v) {
        Some(Value::Array(items)) => items.iter().filter_map(as_id).collect(),
        _ => Vec::new(),
    }
}

fn construct_error(kind: &str, obj: &Value, message: &str) -> InterchangeError {
    InterchangeError::ConstructError {
        kind: kind.to_string(),
        id: lookup_str(obj, &["id"]).unwrap_or_else(|| "?".to_string()),
        message: message.to_string(),
    }
}

fn required_id(obj: &Value, keys: &[&str], kind: &str) -> Result<Id, InterchangeError> {
    lookup_id(obj, keys)
        .ok_or_else(|| construct_error(kind, obj, &format!("missing '{}' field", keys[0])))
}

fn child_array<'a>(
    obj: &'a Value,
    keys: &[&str],
    kind: &str,
) -> Result<&'a [Value], InterchangeError> {
    match lookup(obj, keys) {
        None => Ok(&[]),
        Some(Value::Array(arr)) => Ok(arr.as_slice()),
        Some(_) => Err(construct_error(
            kind,
            obj,
            &format!("'{}' must be an array", keys[0]),
        )),
    }
}

fn parse_access_policy(v: &Value) -> AccessPolicyDoc {
    AccessPolicyDoc {
        allowed_users: id_list(lookup(v, &["allowed_users", "allowedUsers"])),
        allowed_roles: id_list(lookup(v, &["allowed_roles", "allowedRoles"])),
        allowed_permissions: id_list(lookup(v, &["allowed_permissions", "allowedPermissions"])),
        allow_authenticated_users: lookup_bool(
            v,
            &["allow_authenticated_users", "allowAuthenticatedUsers"],
        ),
        email_field_id: lookup_id(v, &["email_field_id", "emailFieldId"]),
    }
}

fn parse_stage(obj: &Value) -> Result<StageDoc, InterchangeError> {
    let id = required_id(obj, &["id"], "Stage")?;
    let sections = child_array(obj, &["sections"], "Stage")?
        .iter()
        .map(parse_section)
        .collect::<Result<Vec<_>, _>>()?;

    let access_policy = embedded(lookup(
        obj,
        &["access_policy", "accessPolicy", "access_rule", "accessRule"],
    ))
    .filter(|v| v.is_object())
    .map(|v| parse_access_policy(&v));

    Ok(StageDoc {
        id,
        name: lookup_str(obj, &["name"]).unwrap_or_default(),
        is_initial: lookup_bool(obj, &["is_initial", "isInitial"]),
        order: lookup_id(obj, &["order"]).unwrap_or(id),
        visibility_condition: embedded(lookup(
            obj,
            &["visibility_condition", "visibilityCondition", "visibilityExpr"],
        )),
        access_policy,
        sections,
    })
}

fn parse_section(obj: &Value) -> Result<SectionDoc, InterchangeError> {
    let id = required_id(obj, &["id"], "Section")?;
    let fields = child_array(obj, &["fields"], "Section")?
        .iter()
        .map(parse_field)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SectionDoc {
        id,
        name: lookup_str(obj, &["name"]).unwrap_or_default(),
        order: lookup_id(obj, &["order"]).unwrap_or(id),
        visibility_condition: embedded(lookup(
            obj,
            &["visibility_condition", "visibilityCondition", "visibilityExpr"],
        )),
        fields,
    })
}

fn parse_field(obj: &Value) -> Result<FieldDoc, InterchangeError> {
    let id = required_id(obj, &["id"], "Field")?;
    let field_type = lookup_str(obj, &["field_type", "fieldType", "fieldTypeName"])
        .ok_or_else(|| construct_error("Field", obj, "missing 'field_type' field"))?;
    let rules = child_array(obj, &["rules"], "Field")?
        .iter()
        .map(parse_field_rule)
        .collect::<Result<Vec<_>, _>>()?;

    let default_value = match lookup(obj, &["default_value", "defaultValue"]) {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(FieldDoc {
        id,
        label: lookup_str(obj, &["label"]).unwrap_or_default(),
        field_type,
        placeholder: lookup_str(obj, &["placeholder"]),
        helper_text: lookup_str(obj, &["helper_text", "helperText"]),
        default_value,
        visibility_condition: embedded(lookup(
            obj,
            &["visibility_condition", "visibilityCondition", "visibilityExpr"],
        )),
        rules,
    })
}

fn parse_field_rule(obj: &Value) -> Result<FieldRuleDoc, InterchangeError> {
    let rule_name = lookup_str(obj, &["rule_name", "ruleName", "inputRuleName", "name"])
        .ok_or_else(|| construct_error("FieldRule", obj, "missing 'rule_name' field"))?;

    Ok(FieldRuleDoc {
        id: lookup_id(obj, &["id"]),
        rule_name,
        rule_description: lookup_str(obj, &["rule_description", "ruleDescription"]),
        rule_props: props_object(lookup(obj, &["rule_props", "ruleProps"])),
        rule_condition: embedded(lookup(obj, &["rule_condition", "ruleCondition"])),
    })
}

fn parse_transition(obj: &Value) -> Result<TransitionDoc, InterchangeError> {
    let id = required_id(obj, &["id"], "Transition")?;
    let from_stage_id = required_id(obj, &["from_stage_id", "fromStageId"], "Transition")?;
    let actions = child_array(obj, &["actions"], "Transition")?
        .iter()
        .map(parse_transition_action)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransitionDoc {
        id,
        from_stage_id,
        to_stage_id: lookup_id(obj, &["to_stage_id", "toStageId"]),
        to_complete: lookup_bool(obj, &["to_complete", "toComplete"]),
        label: lookup_str(obj, &["label"]).unwrap_or_default(),
        condition: embedded(lookup(obj, &["condition", "guard", "guardExpr"])),
        actions,
    })
}

fn parse_transition_action(obj: &Value) -> Result<TransitionActionDoc, InterchangeError> {
    let action_type = lookup_str(
        obj,
        &["action_type", "actionType", "actionTypeName", "action_name"],
    )
    .ok_or_else(|| construct_error("TransitionAction", obj, "missing 'action_type' field"))?;

    Ok(TransitionActionDoc {
        action_id: lookup_id(obj, &["action_id", "actionId"]),
        action_type,
        action_props: props_object(lookup(obj, &["action_props", "actionProps"])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_doc() -> Value {
        json!({
            "id": 7,
            "form_id": 1,
            "form_name": "Leave request",
            "version_number": 0,
            "status": "published",
            "stages": [{
                "id": 10,
                "name": "Request",
                "is_initial": true,
                "sections": [{
                    "id": 100,
                    "name": "Main",
                    "fields": [{
                        "id": 1000,
                        "label": "Reason",
                        "field_type": "Text Input",
                        "rules": [{ "rule_name": "required" }]
                    }]
                }]
            }],
            "transitions": [{
                "id": 50,
                "from_stage_id": 10,
                "to_complete": true,
                "label": "Submit"
            }]
        })
    }

    #[test]
    fn parses_minimal_document() {
        let doc = from_interchange(&minimal_doc()).unwrap();
        assert_eq!(doc.id, 7);
        assert_eq!(doc.status, VersionStatus::Published);
        assert_eq!(doc.stages.len(), 1);
        assert!(doc.stages[0].is_initial);
        assert_eq!(doc.fields().count(), 1);
        assert_eq!(doc.transitions[0].to_stage_id, None);
        assert!(doc.transitions[0].to_complete);
        // Missing props decode to an empty object
        assert_eq!(doc.stages[0].sections[0].fields[0].rules[0].rule_props, json!({}));
    }

    #[test]
    fn accepts_camel_case_keys_and_string_ids() {
        let doc = from_interchange(&json!({
            "id": "3",
            "stages": [{
                "id": "4",
                "isInitial": 1,
                "accessPolicy": { "allowedUsers": ["5", 6], "allowAuthenticatedUsers": false },
                "sections": []
            }],
            "transitions": [{ "id": 9, "fromStageId": "4", "toStageId": null, "toComplete": "1" }]
        }))
        .unwrap();
        assert_eq!(doc.id, 3);
        assert!(doc.stages[0].is_initial);
        let policy = doc.stages[0].access_policy.as_ref().unwrap();
        assert_eq!(policy.allowed_users, vec![5, 6]);
        assert!(doc.transitions[0].to_complete);
    }

    #[test]
    fn decodes_json_text_columns() {
        let doc = from_interchange(&json!({
            "id": 1,
            "stages": [{
                "id": 2,
                "is_initial": true,
                "access_rule": "{\"allowed_roles\": \"[3, 4]\"}",
                "sections": [{
                    "id": 3,
                    "fields": [{
                        "id": 4,
                        "field_type": "Number Input",
                        "visibility_condition": "{\"field_id\": 9, \"operator\": \"filled\"}",
                        "rules": [{ "rule_name": "min", "rule_props": "{\"value\": 5}" }]
                    }]
                }]
            }]
        }))
        .unwrap();
        let stage = &doc.stages[0];
        assert_eq!(stage.access_policy.as_ref().unwrap().allowed_roles, vec![3, 4]);
        let field = &stage.sections[0].fields[0];
        assert_eq!(
            field.visibility_condition,
            Some(json!({"field_id": 9, "operator": "filled"}))
        );
        assert_eq!(field.rules[0].rule_props, json!({"value": 5}));
    }

    #[test]
    fn missing_stages_is_an_error() {
        let err = from_interchange(&json!({ "id": 1 })).unwrap_err();
        assert_eq!(
            err,
            InterchangeError::MissingField {
                field: "stages".to_string()
            }
        );
    }

    #[test]
    fn field_without_type_is_an_error() {
        let err = from_interchange(&json!({
            "id": 1,
            "stages": [{ "id": 2, "sections": [{ "id": 3, "fields": [{ "id": 4 }] }] }]
        }))
        .unwrap_err();
        assert!(matches!(err, InterchangeError::ConstructError { ref kind, .. } if kind == "Field"));
    }

    #[test]
    fn canonical_form_parses_back() {
        let doc = from_interchange(&minimal_doc()).unwrap();
        let again = from_interchange(&to_interchange(&doc)).unwrap();
        assert_eq!(doc, again);
    }
}
