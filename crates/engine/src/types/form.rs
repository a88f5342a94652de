//! Indexed form-version representation built from the interchange document.

use std::collections::HashMap;

use formflow_interchange::{
    FieldDoc, FieldRuleDoc, FormVersionDoc, Id, SectionDoc, StageDoc, TransitionDoc,
    VersionStatus,
};
use serde_json::{Map, Value};

use super::{FieldType, FormError};
use crate::access::AccessPolicy;
use crate::action::ActionKind;
use crate::condition::{parse_condition, Condition};
use crate::rules::RuleKind;

// ──────────────────────────────────────────────
// Form version
// ──────────────────────────────────────────────

/// A loaded form version. Read-only for the engine.
#[derive(Debug, Clone)]
pub struct FormVersion {
    pub id: Id,
    pub form_id: Id,
    pub form_name: String,
    pub version_number: i64,
    pub status: VersionStatus,
    /// Stages in document order.
    pub stages: Vec<Stage>,
    pub transitions: Vec<Transition>,
    // HashMap indexes for O(1) lookups by id
    stage_index: HashMap<Id, usize>,
    /// field id -> (stage, section, field) positions
    field_index: HashMap<Id, (usize, usize, usize)>,
    transition_index: HashMap<Id, usize>,
    initial: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub id: Id,
    pub name: String,
    pub is_initial: bool,
    pub order: i64,
    pub visibility: Option<Condition>,
    pub visibility_raw: Option<Value>,
    pub access_policy: Option<AccessPolicy>,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub id: Id,
    pub name: String,
    pub order: i64,
    pub visibility: Option<Condition>,
    pub visibility_raw: Option<Value>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub id: Id,
    pub label: String,
    /// `None` when the stored type name is outside the catalogue.
    pub field_type: Option<FieldType>,
    /// The type name as stored.
    pub type_name: String,
    pub placeholder: Option<String>,
    pub helper_text: Option<String>,
    pub default_value: Option<String>,
    pub visibility: Option<Condition>,
    pub visibility_raw: Option<Value>,
    pub rules: Vec<FieldRule>,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub id: Option<Id>,
    pub kind: RuleKind,
    pub name: String,
    pub description: Option<String>,
    pub props: Map<String, Value>,
    pub condition: Option<Condition>,
    pub condition_raw: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub id: Id,
    pub from_stage_id: Id,
    pub to_stage_id: Option<Id>,
    pub to_complete: bool,
    pub label: String,
    pub guard: Option<Condition>,
    pub guard_raw: Option<Value>,
    /// Actions in binding order.
    pub actions: Vec<TransitionAction>,
}

#[derive(Debug, Clone)]
pub struct TransitionAction {
    pub action_id: Option<Id>,
    pub kind: ActionKind,
    /// The action type name as stored, e.g. `"Send Email"`.
    pub name: String,
    pub props: Map<String, Value>,
}

impl FormVersion {
    /// Load a stored form-version document.
    pub fn from_interchange(doc: &Value) -> Result<Self, FormError> {
        let doc = formflow_interchange::from_interchange(doc)?;
        FormVersion::from_doc(&doc)
    }

    /// Build the engine representation, parsing every condition and
    /// checking id uniqueness and transition endpoints.
    pub fn from_doc(doc: &FormVersionDoc) -> Result<Self, FormError> {
        let stages = doc
            .stages
            .iter()
            .map(build_stage)
            .collect::<Result<Vec<_>, _>>()?;
        let transitions = doc
            .transitions
            .iter()
            .map(build_transition)
            .collect::<Result<Vec<_>, _>>()?;

        let mut stage_index = HashMap::new();
        let mut field_index = HashMap::new();
        let mut section_ids = HashMap::new();
        let mut initial: Option<usize> = None;
        for (si, stage) in stages.iter().enumerate() {
            if stage_index.insert(stage.id, si).is_some() {
                return Err(FormError::DuplicateId {
                    kind: "stage",
                    id: stage.id,
                });
            }
            if stage.is_initial {
                if let Some(first) = initial {
                    return Err(FormError::MultipleInitialStages {
                        first: stages[first].id,
                        second: stage.id,
                    });
                }
                initial = Some(si);
            }
            for (ci, section) in stage.sections.iter().enumerate() {
                if section_ids.insert(section.id, ()).is_some() {
                    return Err(FormError::DuplicateId {
                        kind: "section",
                        id: section.id,
                    });
                }
                for (fi, field) in section.fields.iter().enumerate() {
                    if field_index.insert(field.id, (si, ci, fi)).is_some() {
                        return Err(FormError::DuplicateId {
                            kind: "field",
                            id: field.id,
                        });
                    }
                }
            }
        }

        let mut transition_index = HashMap::new();
        for (ti, t) in transitions.iter().enumerate() {
            if transition_index.insert(t.id, ti).is_some() {
                return Err(FormError::DuplicateId {
                    kind: "transition",
                    id: t.id,
                });
            }
            for stage_id in std::iter::once(t.from_stage_id).chain(t.to_stage_id) {
                if !stage_index.contains_key(&stage_id) {
                    return Err(FormError::UnknownStage {
                        transition_id: t.id,
                        stage_id,
                    });
                }
            }
        }

        Ok(FormVersion {
            id: doc.id,
            form_id: doc.form_id,
            form_name: doc.form_name.clone(),
            version_number: doc.version_number,
            status: doc.status,
            stages,
            transitions,
            stage_index,
            field_index,
            transition_index,
            initial,
        })
    }

    pub fn get_stage(&self, id: Id) -> Option<&Stage> {
        self.stage_index.get(&id).map(|&i| &self.stages[i])
    }

    pub fn get_field(&self, id: Id) -> Option<&Field> {
        self.field_index
            .get(&id)
            .map(|&(s, c, f)| &self.stages[s].sections[c].fields[f])
    }

    pub fn get_transition(&self, id: Id) -> Option<&Transition> {
        self.transition_index.get(&id).map(|&i| &self.transitions[i])
    }

    pub fn initial_stage(&self) -> Option<&Stage> {
        self.initial.map(|i| &self.stages[i])
    }

    /// Stage that owns a field.
    pub fn stage_of_field(&self, field_id: Id) -> Option<&Stage> {
        self.field_index
            .get(&field_id)
            .map(|&(s, _, _)| &self.stages[s])
    }

    /// Outgoing transitions of a stage, in document order.
    pub fn transitions_from(&self, stage_id: Id) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.from_stage_id == stage_id)
    }

    /// Every field of every stage, in document order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.stages
            .iter()
            .flat_map(|s| s.sections.iter())
            .flat_map(|s| s.fields.iter())
    }

    /// Stages sorted by `(order, id)`.
    pub fn stages_in_order(&self) -> Vec<&Stage> {
        let mut out: Vec<&Stage> = self.stages.iter().collect();
        out.sort_by_key(|s| (s.order, s.id));
        out
    }
}

impl Stage {
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.sections.iter().flat_map(|s| s.fields.iter())
    }

    /// Sections sorted by `(order, id)`.
    pub fn sections_in_order(&self) -> Vec<&Section> {
        let mut out: Vec<&Section> = self.sections.iter().collect();
        out.sort_by_key(|s| (s.order, s.id));
        out
    }
}

// ──────────────────────────────────────────────
// Construction
// ──────────────────────────────────────────────

fn condition(raw: &Option<Value>, owner: impl FnOnce() -> String) -> Result<Option<Condition>, FormError> {
    match raw {
        None => Ok(None),
        Some(v) => parse_condition(v).map_err(|e| FormError::InvalidCondition {
            owner: owner(),
            message: e.message,
        }),
    }
}

fn props(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    }
}

fn build_stage(doc: &StageDoc) -> Result<Stage, FormError> {
    Ok(Stage {
        id: doc.id,
        name: doc.name.clone(),
        is_initial: doc.is_initial,
        order: doc.order,
        visibility: condition(&doc.visibility_condition, || format!("stage {}", doc.id))?,
        visibility_raw: doc.visibility_condition.clone(),
        access_policy: doc.access_policy.as_ref().map(AccessPolicy::from),
        sections: doc
            .sections
            .iter()
            .map(build_section)
            .collect::<Result<_, _>>()?,
    })
}

fn build_section(doc: &SectionDoc) -> Result<Section, FormError> {
    Ok(Section {
        id: doc.id,
        name: doc.name.clone(),
        order: doc.order,
        visibility: condition(&doc.visibility_condition, || format!("section {}", doc.id))?,
        visibility_raw: doc.visibility_condition.clone(),
        fields: doc
            .fields
            .iter()
            .map(build_field)
            .collect::<Result<_, _>>()?,
    })
}

fn build_field(doc: &FieldDoc) -> Result<Field, FormError> {
    let rules = doc
        .rules
        .iter()
        .map(|r| build_rule(doc.id, r))
        .collect::<Result<_, _>>()?;
    Ok(Field {
        id: doc.id,
        label: doc.label.clone(),
        field_type: FieldType::from_name(&doc.field_type),
        type_name: doc.field_type.clone(),
        placeholder: doc.placeholder.clone(),
        helper_text: doc.helper_text.clone(),
        default_value: doc.default_value.clone(),
        visibility: condition(&doc.visibility_condition, || format!("field {}", doc.id))?,
        visibility_raw: doc.visibility_condition.clone(),
        rules,
    })
}

fn build_rule(field_id: Id, doc: &FieldRuleDoc) -> Result<FieldRule, FormError> {
    Ok(FieldRule {
        id: doc.id,
        kind: RuleKind::from_name(&doc.rule_name),
        name: doc.rule_name.clone(),
        description: doc.rule_description.clone(),
        props: props(&doc.rule_props),
        condition: condition(&doc.rule_condition, || {
            format!("rule '{}' of field {}", doc.rule_name, field_id)
        })?,
        condition_raw: doc.rule_condition.clone(),
    })
}

fn build_transition(doc: &TransitionDoc) -> Result<Transition, FormError> {
    Ok(Transition {
        id: doc.id,
        from_stage_id: doc.from_stage_id,
        to_stage_id: doc.to_stage_id,
        to_complete: doc.to_complete,
        label: doc.label.clone(),
        guard: condition(&doc.condition, || format!("transition {}", doc.id))?,
        guard_raw: doc.condition.clone(),
        actions: doc
            .actions
            .iter()
            .map(|a| TransitionAction {
                action_id: a.action_id,
                kind: ActionKind::from_name(&a.action_type),
                name: a.action_type.clone(),
                props: props(&a.action_props),
            })
            .collect(),
    })
}
