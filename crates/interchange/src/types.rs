//! Typed structs representing a stored form-version document.
//!
//! Expression trees (visibility conditions, rule conditions, transition
//! guards) and parameter bags (rule props, action props) are kept as
//! `serde_json::Value`. The engine is the only consumer that interprets
//! them, and it does so once, when the form is loaded.

use serde::{Deserialize, Serialize};

/// Identifier type shared by every stored row (form, stage, field, user, ...).
pub type Id = i64;

/// Publication status of a form version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Published,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Published => "published",
            VersionStatus::Archived => "archived",
        }
    }

    /// Parse a status string. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(VersionStatus::Draft),
            "published" => Some(VersionStatus::Published),
            "archived" => Some(VersionStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level form version document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormVersionDoc {
    pub id: Id,
    pub form_id: Id,
    /// Name of the owning form (default language).
    pub form_name: String,
    pub version_number: i64,
    pub status: VersionStatus,
    pub stages: Vec<StageDoc>,
    pub transitions: Vec<TransitionDoc>,
}

impl FormVersionDoc {
    /// Iterate over every field of every stage, in document order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDoc> {
        self.stages
            .iter()
            .flat_map(|s| s.sections.iter())
            .flat_map(|s| s.fields.iter())
    }
}

// ── Stage ───────────────────────────────────────────────────────────

/// Access restrictions attached to a stage.
///
/// Empty lists, `allow_authenticated_users = false` and no
/// `email_field_id` together mean "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessPolicyDoc {
    pub allowed_users: Vec<Id>,
    pub allowed_roles: Vec<Id>,
    pub allowed_permissions: Vec<Id>,
    pub allow_authenticated_users: bool,
    pub email_field_id: Option<Id>,
}

/// A node of the stage graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageDoc {
    pub id: Id,
    pub name: String,
    pub is_initial: bool,
    pub order: i64,
    pub visibility_condition: Option<serde_json::Value>,
    pub access_policy: Option<AccessPolicyDoc>,
    pub sections: Vec<SectionDoc>,
}

// ── Section / Field ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionDoc {
    pub id: Id,
    pub name: String,
    pub order: i64,
    pub visibility_condition: Option<serde_json::Value>,
    pub fields: Vec<FieldDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDoc {
    pub id: Id,
    pub label: String,
    /// Field type name, e.g. `"Text Input"` or `"Multi_Select"`.
    pub field_type: String,
    pub placeholder: Option<String>,
    pub helper_text: Option<String>,
    /// Default value as stored text (JSON text for structured defaults).
    pub default_value: Option<String>,
    pub visibility_condition: Option<serde_json::Value>,
    pub rules: Vec<FieldRuleDoc>,
}

/// Binding of a field to a named validation rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldRuleDoc {
    pub id: Option<Id>,
    pub rule_name: String,
    pub rule_description: Option<String>,
    /// Parameter bag; always a JSON object after deserialization.
    pub rule_props: serde_json::Value,
    pub rule_condition: Option<serde_json::Value>,
}

// ── Transition ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionDoc {
    pub id: Id,
    pub from_stage_id: Id,
    pub to_stage_id: Option<Id>,
    pub to_complete: bool,
    pub label: String,
    /// Optional guard expression.
    pub condition: Option<serde_json::Value>,
    /// Actions in binding order.
    pub actions: Vec<TransitionActionDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionActionDoc {
    pub action_id: Option<Id>,
    /// Action type name, e.g. `"Send Email"`.
    pub action_type: String,
    /// Parameter bag; always a JSON object after deserialization.
    pub action_props: serde_json::Value,
}
