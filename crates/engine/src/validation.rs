//! Submission-level validation: visibility, rule activation, rule dispatch,
//! and resolution of `unique` lookups against the store.

use std::collections::BTreeMap;

use formflow_interchange::Id;
use formflow_storage::{FormStorage, StorageError};
use serde_json::Value;

use crate::condition;
use crate::rules::{check_rule, RuleContext, RuleKind, RuleVerdict, UniqueLookup, UNIQUE_MESSAGE};
use crate::types::{stored_to_value, FormVersion, Stage, ValueMap};

/// Per-field error messages. Empty means the submission is valid.
pub type ValidationErrors = BTreeMap<Id, Vec<String>>;

/// Outcome of the pure pass: messages so far, plus the `unique` lookups
/// still to resolve.
#[derive(Debug, Default)]
pub struct PendingValidation {
    pub errors: ValidationErrors,
    pub lookups: Vec<(Id, UniqueLookup)>,
}

/// Run every active rule of every visible field in `to_validate`.
///
/// `all_values` is the full picture (stored plus submitted) that visibility
/// and rule conditions are evaluated against.
pub fn validate_values(
    form: &FormVersion,
    to_validate: &ValueMap,
    all_values: &ValueMap,
    entry_id: Option<Id>,
) -> PendingValidation {
    let mut out = PendingValidation::default();
    for (&field_id, value) in to_validate {
        let Some(field) = form.get_field(field_id) else {
            out.errors.insert(field_id, vec!["Field not found".to_string()]);
            continue;
        };
        if field.field_type.is_none() {
            out.errors.insert(
                field_id,
                vec![format!("Unknown field type: {}", field.type_name)],
            );
            continue;
        }
        if !condition::evaluate(field.visibility.as_ref(), all_values) {
            continue;
        }
        let ctx = RuleContext { field_id, entry_id };
        for rule in &field.rules {
            if !condition::evaluate(rule.condition.as_ref(), all_values) {
                continue;
            }
            match check_rule(value, field.field_type, &rule.kind, &rule.props, &ctx) {
                RuleVerdict::Valid => {}
                RuleVerdict::Invalid(message) => {
                    out.errors.entry(field_id).or_default().push(message);
                }
                RuleVerdict::Lookup(lookup) => out.lookups.push((field_id, lookup)),
            }
        }
    }
    out
}

/// Full validation including `unique` lookups.
pub async fn validate_submission_values<S: FormStorage>(
    storage: &S,
    form: &FormVersion,
    to_validate: &ValueMap,
    all_values: &ValueMap,
    entry_id: Option<Id>,
) -> Result<ValidationErrors, StorageError> {
    let PendingValidation {
        mut errors,
        lookups,
    } = validate_values(form, to_validate, all_values, entry_id);
    for (field_id, lookup) in lookups {
        let taken = storage
            .value_exists(lookup.field_id, &lookup.value, lookup.exclude_entry_id)
            .await?;
        if taken {
            errors
                .entry(field_id)
                .or_default()
                .push(UNIQUE_MESSAGE.to_string());
        }
    }
    Ok(errors)
}

/// The values a stage submission is validated on: every submitted value,
/// plus each required field of the acting stage that was not submitted,
/// taken from the stored values or `null`. A required field cannot be
/// skipped by leaving it out of the payload.
pub fn values_to_validate(
    stage: &Stage,
    submitted: &ValueMap,
    stored: &BTreeMap<Id, String>,
) -> ValueMap {
    let mut out = submitted.clone();
    let required = stage
        .fields()
        .filter(|f| f.rules.iter().any(|r| r.kind == RuleKind::Required));
    for field in required {
        out.entry(field.id).or_insert_with(|| {
            stored
                .get(&field.id)
                .map(|s| stored_to_value(s))
                .unwrap_or(Value::Null)
        });
    }
    out
}

/// Stored values overlaid with submitted ones.
pub fn merge_values(stored: &BTreeMap<Id, String>, submitted: &ValueMap) -> ValueMap {
    let mut out: ValueMap = stored
        .iter()
        .map(|(&id, text)| (id, stored_to_value(text)))
        .collect();
    out.extend(submitted.iter().map(|(&id, v)| (id, v.clone())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_storage::{EntryValueRecord, MemoryStorage, NewEntry};
    use serde_json::json;

    fn form() -> FormVersion {
        FormVersion::from_interchange(&json!({
            "id": 1, "form_id": 1, "form_name": "Signup", "status": "published",
            "stages": [{"id": 1, "name": "Start", "is_initial": true, "sections": [
                {"id": 1, "name": "Main", "fields": [
                    {"id": 10, "label": "Name", "field_type": "Text Input",
                     "rules": [{"rule_name": "required"}, {"rule_name": "min", "rule_props": {"value": 3}}]},
                    {"id": 11, "label": "Has pet", "field_type": "Checkbox"},
                    {"id": 12, "label": "Pet name", "field_type": "Text Input",
                     "visibility_condition": {"field_id": 11, "operator": "equals", "value": "1"},
                     "rules": [{"rule_name": "required"}]},
                    {"id": 13, "label": "Email", "field_type": "Email Input",
                     "rules": [
                        {"rule_name": "email", "rule_condition": {"field_id": 13, "operator": "filled"}},
                        {"rule_name": "unique"}
                     ]},
                    {"id": 14, "label": "Odd", "field_type": "Warp Drive"}
                ]}
            ]}]
        }))
        .unwrap()
    }

    fn map(pairs: &[(Id, Value)]) -> ValueMap {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn hidden_fields_are_skipped() {
        let f = form();
        let submitted = map(&[(10, json!("Ann")), (12, json!(""))]);
        let result = validate_values(&f, &submitted, &submitted, None);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let submitted = map(&[(10, json!("Ann")), (11, json!("1")), (12, json!(""))]);
        let result = validate_values(&f, &submitted, &submitted, None);
        assert_eq!(result.errors[&12], vec!["This field is required."]);
    }

    #[test]
    fn messages_accumulate_per_field() {
        let f = form();
        let submitted = map(&[(10, json!(""))]);
        let result = validate_values(&f, &submitted, &submitted, None);
        assert_eq!(
            result.errors[&10],
            vec!["This field is required.", "Must be at least 3 characters."]
        );
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let f = form();
        let submitted = map(&[(13, json!(""))]);
        let result = validate_values(&f, &submitted, &submitted, None);
        assert!(!result.errors.contains_key(&13));
        assert_eq!(result.lookups.len(), 1);
    }

    #[test]
    fn configuration_problems_are_messages() {
        let f = form();
        let submitted = map(&[(99, json!("x")), (14, json!("y"))]);
        let result = validate_values(&f, &submitted, &submitted, None);
        assert_eq!(result.errors[&99], vec!["Field not found"]);
        assert_eq!(result.errors[&14], vec!["Unknown field type: Warp Drive"]);
    }

    #[test]
    fn omitted_required_fields_are_validated() {
        let f = form();
        let stage = f.initial_stage().unwrap();
        let values = values_to_validate(stage, &map(&[(13, json!("a@b.io"))]), &BTreeMap::new());
        assert_eq!(values[&10], Value::Null);
        assert_eq!(values[&12], Value::Null);
        assert!(!values.contains_key(&11));
        assert_eq!(values[&13], json!("a@b.io"));

        let stored = BTreeMap::from([(10, "Ann".to_string())]);
        let values = values_to_validate(stage, &ValueMap::new(), &stored);
        assert_eq!(values[&10], json!("Ann"));
    }

    #[test]
    fn merged_values_prefer_submission() {
        let stored = BTreeMap::from([(1, "old".to_string()), (2, r#"["a"]"#.to_string())]);
        let merged = merge_values(&stored, &map(&[(1, json!("new"))]));
        assert_eq!(merged[&1], json!("new"));
        assert_eq!(merged[&2], json!(["a"]));
    }

    #[tokio::test]
    async fn unique_lookup_hits_store() {
        let storage = MemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        let entry = storage
            .insert_entry(
                &mut snap,
                NewEntry {
                    form_version_id: 1,
                    current_stage_id: 1,
                    public_identifier: "p-1".into(),
                    created_by: None,
                    created_at: "2026-01-01T00:00:00Z".into(),
                },
            )
            .await
            .unwrap();
        storage
            .upsert_entry_value(
                &mut snap,
                EntryValueRecord {
                    entry_id: entry.id,
                    field_id: 13,
                    value: "taken@x.io".into(),
                },
            )
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let f = form();
        let submitted = map(&[(13, json!("Taken@X.io"))]);
        let errors = validate_submission_values(&storage, &f, &submitted, &submitted, None)
            .await
            .unwrap();
        assert_eq!(errors[&13], vec!["This value has already been used."]);

        let errors =
            validate_submission_values(&storage, &f, &submitted, &submitted, Some(entry.id))
                .await
                .unwrap();
        assert!(errors.is_empty());
    }
}
