//! formflow engine: evaluates visibility conditions, validates and coerces
//! submitted values, guards stage access, advances entries through the stage
//! graph and fires the side-effecting actions bound to transitions.
//!
//! The engine consumes the form-version documents of `formflow-interchange`
//! and persists through any `formflow_storage::FormStorage` backend.

pub mod access;
pub mod action;
pub mod blob;
pub mod coerce;
pub mod condition;
pub mod dates;
pub mod delivery;
pub mod directory;
pub mod identity;
pub mod interpolate;
pub mod numeric;
pub mod rules;
pub mod structure;
pub mod submission;
pub mod transition;
pub mod translation;
pub mod types;
pub mod validation;

pub use action::{ActionExecutor, ActionKind, ActionResult};
pub use blob::{BlobError, BlobStore, FsBlobStore, SubmittedValue, Upload};
pub use condition::{Condition, ConditionError, Logic, Operator};
pub use identity::Identity;
pub use rules::{RuleKind, RuleVerdict};
pub use structure::{AccessibleForm, EntryStructure, FormStructure};
pub use submission::{
    Collaborators, EngineSettings, SubmissionError, SubmissionOrchestrator, SubmissionOutcome,
};
pub use transition::{TransitionEffect, TransitionError};
pub use types::{FieldType, FormError, FormVersion, ValueMap};
pub use validation::ValidationErrors;
