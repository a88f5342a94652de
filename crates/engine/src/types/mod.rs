//! Engine-side form representation.
//!
//! These types are DISTINCT from the interchange documents: conditions are
//! parsed into [`crate::condition::Condition`], rule and action names into
//! closed enums, and lookups are indexed by id.

mod field_type;
mod form;

pub use field_type::FieldType;
pub use form::{
    Field, FieldRule, FormVersion, Section, Stage, Transition, TransitionAction,
};

use std::collections::BTreeMap;
use std::fmt;

use formflow_interchange::Id;
use serde_json::Value;

/// Flat `field id -> value` map that conditions are evaluated against.
pub type ValueMap = BTreeMap<Id, Value>;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Structural problems found while loading a form-version document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The stored document does not deserialize.
    Interchange { message: String },
    /// Two stages, sections, fields or transitions share an id.
    DuplicateId { kind: &'static str, id: Id },
    /// More than one stage is flagged initial.
    MultipleInitialStages { first: Id, second: Id },
    /// A transition references a stage outside this version.
    UnknownStage { transition_id: Id, stage_id: Id },
    /// A stored condition has an unusable shape.
    InvalidCondition { owner: String, message: String },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormError::Interchange { message } => {
                write!(f, "form document error: {}", message)
            }
            FormError::DuplicateId { kind, id } => {
                write!(f, "duplicate {} id {}", kind, id)
            }
            FormError::MultipleInitialStages { first, second } => {
                write!(f, "stages {} and {} are both initial", first, second)
            }
            FormError::UnknownStage {
                transition_id,
                stage_id,
            } => {
                write!(
                    f,
                    "transition {} references unknown stage {}",
                    transition_id, stage_id
                )
            }
            FormError::InvalidCondition { owner, message } => {
                write!(f, "invalid condition on {}: {}", owner, message)
            }
        }
    }
}

impl std::error::Error for FormError {}

impl From<formflow_interchange::InterchangeError> for FormError {
    fn from(e: formflow_interchange::InterchangeError) -> Self {
        FormError::Interchange {
            message: e.to_string(),
        }
    }
}

/// Parse a stored value (always text) back into the JSON it represents when
/// the text is a JSON array or object; plain text stays a string.
pub fn stored_to_value(text: &str) -> Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(text) {
            return v;
        }
    }
    Value::String(text.to_string())
}
