//! Read paths: what a client needs to render a form or an entry.
//!
//! Nothing here writes. Visibility conditions are passed through raw so the
//! client can evaluate them live; access is checked the same way the write
//! paths check it.

use std::collections::BTreeMap;

use formflow_interchange::{Id, VersionStatus};
use formflow_storage::FormStorage;
use serde::Serialize;
use serde_json::Value;

use crate::access::{accessible_form_versions, can_access, AccessPolicy, EntryView};
use crate::identity::Identity;
use crate::submission::{SubmissionError, SubmissionOrchestrator};
use crate::translation::{resolve_language, TranslationKey, Translations};
use crate::types::{Field, FieldRule, FormVersion, Section, Stage, Transition};

// ──────────────────────────────────────────────
// Views
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormStructure {
    pub form_version_id: Id,
    pub form_name: String,
    pub version_number: i64,
    /// The initial stage.
    pub stage: StageView,
    pub available_transitions: Vec<TransitionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStructure {
    pub entry_id: Id,
    pub public_identifier: String,
    pub form_name: String,
    pub is_complete: bool,
    pub current_stage_id: Id,
    /// Stages up to and including the current one, in stage order.
    pub stages: Vec<EntryStageView>,
    /// Transitions out of the current stage; empty once complete.
    pub available_transitions: Vec<TransitionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStageView {
    pub stage_id: Id,
    pub stage_name: String,
    pub is_current: bool,
    pub is_readonly: bool,
    pub structure: StageView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageView {
    pub stage_id: Id,
    pub stage_name: String,
    pub is_initial: bool,
    pub visibility_condition: Option<Value>,
    pub access_rule: Option<AccessPolicy>,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub section_id: Id,
    pub section_name: String,
    pub section_order: i64,
    pub visibility_condition: Option<Value>,
    pub fields: Vec<FieldView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldView {
    pub field_id: Id,
    pub field_type: String,
    pub label: String,
    pub placeholder: Option<String>,
    pub helper_text: Option<String>,
    /// JSON-decoded when the stored default is JSON text.
    pub default_value: Option<Value>,
    /// Stored value, as stored.
    pub current_value: Option<String>,
    pub visibility_condition: Option<Value>,
    pub rules: Vec<RuleView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    pub rule_id: Option<Id>,
    pub rule_name: String,
    pub rule_description: Option<String>,
    pub rule_props: Value,
    pub rule_condition: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionView {
    pub transition_id: Id,
    pub label: String,
    pub to_stage_id: Option<Id>,
    pub to_stage_name: Option<String>,
    pub to_complete: bool,
    pub condition: Option<Value>,
    pub actions: Vec<TransitionActionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionActionView {
    pub action_id: Option<Id>,
    pub action_name: String,
}

/// A form the caller may start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessibleForm {
    pub form_id: Id,
    pub form_version_id: Id,
    pub name: String,
    pub version_number: i64,
}

// ──────────────────────────────────────────────
// Builders
// ──────────────────────────────────────────────

/// Renders form parts in one language.
struct Renderer<'a> {
    form: &'a FormVersion,
    translations: &'a dyn Translations,
    language_id: Option<Id>,
}

impl Renderer<'_> {
    fn text(&self, key: TranslationKey, fallback: &str) -> String {
        self.translations.localize(key, self.language_id, fallback)
    }

    fn optional(&self, key: TranslationKey, fallback: Option<&str>) -> Option<String> {
        self.language_id
            .and_then(|lang| self.translations.get(key, lang))
            .or_else(|| fallback.map(str::to_string))
    }

    fn form_name(&self) -> String {
        self.text(TranslationKey::FormName(self.form.id), &self.form.form_name)
    }

    fn stage_name(&self, stage: &Stage) -> String {
        self.text(TranslationKey::StageName(stage.id), &stage.name)
    }

    fn stage(&self, stage: &Stage, values: &BTreeMap<Id, String>) -> StageView {
        StageView {
            stage_id: stage.id,
            stage_name: self.stage_name(stage),
            is_initial: stage.is_initial,
            visibility_condition: stage.visibility_raw.clone(),
            access_rule: stage.access_policy.clone(),
            sections: stage
                .sections_in_order()
                .into_iter()
                .map(|s| self.section(s, values))
                .collect(),
        }
    }

    fn section(&self, section: &Section, values: &BTreeMap<Id, String>) -> SectionView {
        SectionView {
            section_id: section.id,
            section_name: self.text(TranslationKey::SectionName(section.id), &section.name),
            section_order: section.order,
            visibility_condition: section.visibility_raw.clone(),
            fields: section
                .fields
                .iter()
                .map(|f| self.field(f, values.get(&f.id)))
                .collect(),
        }
    }

    fn field(&self, field: &Field, current: Option<&String>) -> FieldView {
        let default_value = self
            .optional(
                TranslationKey::FieldDefaultValue(field.id),
                field.default_value.as_deref(),
            )
            .map(|text| decode_default(&text));
        FieldView {
            field_id: field.id,
            field_type: field.type_name.clone(),
            label: self.text(TranslationKey::FieldLabel(field.id), &field.label),
            placeholder: field.placeholder.clone(),
            helper_text: self.optional(
                TranslationKey::FieldHelperText(field.id),
                field.helper_text.as_deref(),
            ),
            default_value,
            current_value: current.cloned(),
            visibility_condition: field.visibility_raw.clone(),
            rules: field.rules.iter().map(rule_view).collect(),
        }
    }

    fn transition(&self, transition: &Transition) -> TransitionView {
        let to_stage = transition.to_stage_id.and_then(|id| self.form.get_stage(id));
        TransitionView {
            transition_id: transition.id,
            label: self.text(TranslationKey::TransitionLabel(transition.id), &transition.label),
            to_stage_id: transition.to_stage_id,
            to_stage_name: to_stage.map(|s| self.stage_name(s)),
            to_complete: transition.to_complete,
            condition: transition.guard_raw.clone(),
            actions: transition
                .actions
                .iter()
                .map(|a| TransitionActionView {
                    action_id: a.action_id,
                    action_name: a.name.clone(),
                })
                .collect(),
        }
    }

    fn transitions_from(&self, stage_id: Id) -> Vec<TransitionView> {
        self.form
            .transitions_from(stage_id)
            .map(|t| self.transition(t))
            .collect()
    }
}

fn rule_view(rule: &FieldRule) -> RuleView {
    RuleView {
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        rule_description: rule.description.clone(),
        rule_props: Value::Object(rule.props.clone()),
        rule_condition: rule.condition_raw.clone(),
    }
}

/// JSON text becomes its value; anything else stays a string.
fn decode_default(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

// ──────────────────────────────────────────────
// Read operations
// ──────────────────────────────────────────────

impl<S: FormStorage> SubmissionOrchestrator<S> {
    fn renderer<'a>(
        &'a self,
        form: &'a FormVersion,
        language_id: Option<Id>,
        identity: Option<&Identity>,
    ) -> Renderer<'a> {
        Renderer {
            form,
            translations: self.translations.as_ref(),
            language_id: resolve_language(
                language_id,
                identity,
                self.settings.default_language_id,
            ),
        }
    }

    /// The initial stage of a form version and the transitions leaving it.
    pub async fn get_form_structure(
        &self,
        form_version_id: Id,
        identity: Option<&Identity>,
        language_id: Option<Id>,
    ) -> Result<FormStructure, SubmissionError> {
        let form = self.load_form(form_version_id).await?;
        let stage = form.initial_stage().ok_or_else(|| {
            SubmissionError::NotFound(format!(
                "form version {} has no initial stage",
                form_version_id
            ))
        })?;
        if !can_access(stage, identity, None) {
            return Err(SubmissionError::AccessDenied(
                "You do not have access to this form.".to_string(),
            ));
        }

        let r = self.renderer(&form, language_id, identity);
        Ok(FormStructure {
            form_version_id: form.id,
            form_name: r.form_name(),
            version_number: form.version_number,
            stage: r.stage(stage, &BTreeMap::new()),
            available_transitions: r.transitions_from(stage.id),
        })
    }

    /// An entry with its stages so far: earlier stages read-only, the
    /// current stage editable, later stages omitted.
    pub async fn get_entry_by_public_identifier(
        &self,
        public_identifier: &str,
        identity: Option<&Identity>,
        language_id: Option<Id>,
    ) -> Result<EntryStructure, SubmissionError> {
        let entry = self
            .storage
            .get_entry_by_public_identifier(public_identifier)
            .await?;
        let form = self.load_form(entry.form_version_id).await?;
        let current = form.get_stage(entry.current_stage_id).ok_or_else(|| {
            SubmissionError::Internal(format!(
                "entry {} points at unknown stage {}",
                entry.id, entry.current_stage_id
            ))
        })?;
        let stored = self.stored_values(entry.id).await?;
        let view = EntryView {
            form: &form,
            values: &stored,
        };
        if !can_access(current, identity, Some(view)) {
            return Err(SubmissionError::AccessDenied(
                "You do not have access to this entry at its current stage.".to_string(),
            ));
        }

        let r = self.renderer(&form, language_id, identity);
        let mut stages = Vec::new();
        for stage in form.stages_in_order() {
            let is_current = stage.id == current.id;
            stages.push(EntryStageView {
                stage_id: stage.id,
                stage_name: r.stage_name(stage),
                is_current,
                is_readonly: !is_current,
                structure: r.stage(stage, &stored),
            });
            if is_current {
                break;
            }
        }
        let available_transitions = if entry.is_complete {
            vec![]
        } else {
            r.transitions_from(current.id)
        };

        Ok(EntryStructure {
            entry_id: entry.id,
            public_identifier: entry.public_identifier,
            form_name: r.form_name(),
            is_complete: entry.is_complete,
            current_stage_id: entry.current_stage_id,
            stages,
            available_transitions,
        })
    }

    /// The latest published version of every form whose initial stage the
    /// caller may access, ordered by form id.
    pub async fn accessible_forms(
        &self,
        identity: Option<&Identity>,
        language_id: Option<Id>,
    ) -> Result<Vec<AccessibleForm>, SubmissionError> {
        let records = self
            .storage
            .list_form_versions(None, Some(VersionStatus::Published))
            .await?;
        let mut forms = Vec::with_capacity(records.len());
        for record in &records {
            match FormVersion::from_doc(&record.document) {
                Ok(form) => forms.push(form),
                Err(e) => tracing::warn!(
                    form_version_id = record.id,
                    error = %e,
                    "skipping unreadable form version"
                ),
            }
        }

        let mut latest: BTreeMap<Id, &FormVersion> = BTreeMap::new();
        for form in accessible_form_versions(&forms, identity) {
            let newer = latest
                .get(&form.form_id)
                .map_or(true, |seen| form.version_number > seen.version_number);
            if newer {
                latest.insert(form.form_id, form);
            }
        }
        Ok(latest
            .into_values()
            .map(|form| {
                let r = self.renderer(form, language_id, identity);
                AccessibleForm {
                    form_id: form.form_id,
                    form_version_id: form.id,
                    name: r.form_name(),
                    version_number: form.version_number,
                }
            })
            .collect())
    }
}
