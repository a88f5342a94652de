use async_trait::async_trait;
use formflow_interchange::{FormVersionDoc, Id, VersionStatus};

use crate::error::StorageError;
use crate::record::{
    EntryProgress, EntryRecord, EntryValueRecord, FormVersionRecord, NewEntry, NewFormVersion,
};

/// The storage trait for formflow backends.
///
/// A `FormStorage` implementation provides transactional storage for form
/// versions, entries and entry values.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` starts a transaction and returns a `Snapshot`
/// 2. mutating methods are called with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` commits and consumes the transaction,
///    or `abort_snapshot(snapshot)` rolls it back
///
/// A `Snapshot` dropped without committing MUST leave no trace.
///
/// ## OCC Conflict Detection
///
/// Every entry carries a `version`. `update_entry_progress` checks the
/// expected version and bumps it. Backends must also detect, no later than
/// commit, that an entry read through `get_entry_for_update` was changed by
/// another committed transaction, and fail with
/// `StorageError::ConcurrentConflict`. After such a failure nothing from the
/// snapshot is visible.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared as axum
/// application state and across async task boundaries.
#[async_trait]
pub trait FormStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations visible at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Entry operations (within snapshot) ───────────────────────────────────

    /// Create a new entry at version 0, not complete, not considered.
    async fn insert_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: NewEntry,
    ) -> Result<EntryRecord, StorageError>;

    /// Read an entry by public identifier and register its version for the
    /// commit-time conflict check.
    async fn get_entry_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        public_identifier: &str,
    ) -> Result<EntryRecord, StorageError>;

    /// Move an entry to a new stage and/or completion state.
    ///
    /// Fails with `ConcurrentConflict` if the entry's version differs from
    /// `expected_version`, and with `EntryFrozen` if the entry is already
    /// complete. Returns the new version.
    async fn update_entry_progress(
        &self,
        snapshot: &mut Self::Snapshot,
        entry_id: Id,
        expected_version: i64,
        progress: EntryProgress,
    ) -> Result<i64, StorageError>;

    /// Insert or overwrite the value for (entry, field).
    ///
    /// Fails with `EntryFrozen` if the entry is complete.
    async fn upsert_entry_value(
        &self,
        snapshot: &mut Self::Snapshot,
        value: EntryValueRecord,
    ) -> Result<(), StorageError>;

    /// Set the reviewer flag on a batch of entries. Returns how many changed.
    async fn set_considered(
        &self,
        snapshot: &mut Self::Snapshot,
        entry_ids: &[Id],
        is_considered: bool,
    ) -> Result<usize, StorageError>;

    // ── Form version operations (within snapshot) ────────────────────────────

    /// Store a new form version. The document's `id`, `form_id`,
    /// `version_number` and `status` are overwritten from the record.
    async fn insert_form_version(
        &self,
        snapshot: &mut Self::Snapshot,
        version: NewFormVersion,
    ) -> Result<FormVersionRecord, StorageError>;

    /// Replace the structure of a draft version.
    async fn update_draft_document(
        &self,
        snapshot: &mut Self::Snapshot,
        id: Id,
        document: FormVersionDoc,
    ) -> Result<(), StorageError>;

    /// Publish a draft version. Any other published version of the same form
    /// returns to draft.
    async fn publish_form_version(
        &self,
        snapshot: &mut Self::Snapshot,
        id: Id,
        published_at: &str,
    ) -> Result<FormVersionRecord, StorageError>;

    // ── Queries (committed state) ────────────────────────────────────────────

    async fn get_form_version(&self, id: Id) -> Result<FormVersionRecord, StorageError>;

    /// List versions, optionally filtered by form and status, ordered by
    /// (form_id, version_number).
    async fn list_form_versions(
        &self,
        form_id: Option<Id>,
        status: Option<VersionStatus>,
    ) -> Result<Vec<FormVersionRecord>, StorageError>;

    async fn get_entry(&self, entry_id: Id) -> Result<EntryRecord, StorageError>;

    async fn get_entry_by_public_identifier(
        &self,
        public_identifier: &str,
    ) -> Result<EntryRecord, StorageError>;

    /// All stored values of an entry, ordered by field id.
    async fn list_entry_values(&self, entry_id: Id) -> Result<Vec<EntryValueRecord>, StorageError>;

    /// Whether any entry other than `exclude_entry_id` stores exactly `value`
    /// for `field_id`.
    async fn value_exists(
        &self,
        field_id: Id,
        value: &str,
        exclude_entry_id: Option<Id>,
    ) -> Result<bool, StorageError>;
}
