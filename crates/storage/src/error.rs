use formflow_interchange::{Id, VersionStatus};

/// All errors that can be returned by a FormStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another transaction modified
    /// the entry after this snapshot read it.
    #[error("concurrent conflict on entry {entry_id}: expected version {expected_version}")]
    ConcurrentConflict { entry_id: Id, expected_version: i64 },

    /// No entry matches the given id or public identifier.
    #[error("entry not found: {reference}")]
    EntryNotFound { reference: String },

    /// The entry is complete; its values and progress can no longer change.
    #[error("entry {entry_id} is complete and cannot be modified")]
    EntryFrozen { entry_id: Id },

    #[error("form version not found: {id}")]
    FormVersionNotFound { id: Id },

    #[error("form version already exists: {id}")]
    FormVersionExists { id: Id },

    /// The form has no versions to derive a new one from.
    #[error("form not found: {form_id}")]
    FormNotFound { form_id: Id },

    /// Structure mutation or publication attempted on a non-draft version.
    #[error("form version {id} is {status}; only draft versions can be changed")]
    VersionNotDraft { id: Id, status: VersionStatus },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
