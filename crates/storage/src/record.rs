use formflow_interchange::{FormVersionDoc, Id, VersionStatus};
use serde::{Deserialize, Serialize};

/// A stored form version: metadata plus the full structure document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormVersionRecord {
    pub id: Id,
    pub form_id: Id,
    pub version_number: i64,
    pub status: VersionStatus,
    /// ISO 8601 / RFC 3339 timestamp string. None while never published.
    pub published_at: Option<String>,
    pub document: FormVersionDoc,
}

/// Input for creating a form version. `id: None` lets the backend allocate one.
#[derive(Debug, Clone)]
pub struct NewFormVersion {
    pub id: Option<Id>,
    pub form_id: Id,
    pub version_number: i64,
    pub status: VersionStatus,
    pub document: FormVersionDoc,
}

/// One form submission instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryRecord {
    pub id: Id,
    pub form_version_id: Id,
    pub current_stage_id: Id,
    pub is_complete: bool,
    pub is_considered: bool,
    /// Opaque public identifier (UUID text), immutable.
    pub public_identifier: String,
    pub created_by: Option<Id>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub updated_at: String,
    /// OCC version, starts at 0 and increments on every update.
    pub version: i64,
}

/// Input for creating an entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub form_version_id: Id,
    pub current_stage_id: Id,
    pub public_identifier: String,
    pub created_by: Option<Id>,
    pub created_at: String,
}

/// New stage pointer and completion flag applied by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProgress {
    pub current_stage_id: Id,
    pub is_complete: bool,
    pub updated_at: String,
}

/// One (entry, field) value in canonical text form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryValueRecord {
    pub entry_id: Id,
    pub field_id: Id,
    pub value: String,
}
