//! In-process `FormStorage` backend.
//!
//! Committed state lives behind a mutex. A snapshot buffers every write and
//! remembers the version of each existing entry it touched; `commit_snapshot`
//! re-checks those versions under the lock and applies the buffer only if
//! none of them moved.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use formflow_interchange::{FormVersionDoc, Id, VersionStatus};

use crate::error::StorageError;
use crate::record::{
    EntryProgress, EntryRecord, EntryValueRecord, FormVersionRecord, NewEntry, NewFormVersion,
};
use crate::traits::FormStorage;

#[derive(Debug, Default)]
struct State {
    form_versions: BTreeMap<Id, FormVersionRecord>,
    entries: BTreeMap<Id, EntryRecord>,
    /// Keyed by (entry_id, field_id).
    values: BTreeMap<(Id, Id), String>,
}

/// Buffered writes of one in-flight transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    entries: BTreeMap<Id, EntryRecord>,
    new_entries: BTreeSet<Id>,
    /// entry_id -> committed version observed when first touched.
    expectations: BTreeMap<Id, i64>,
    values: BTreeMap<(Id, Id), String>,
    form_versions: BTreeMap<Id, FormVersionRecord>,
    new_form_versions: BTreeSet<Id>,
}

/// `FormStorage` kept entirely in memory. Cheap to construct; used by the
/// CLI, the test suites and as the reference conformance backend.
#[derive(Debug)]
pub struct MemoryStorage {
    state: Mutex<State>,
    next_entry_id: AtomicI64,
    next_version_id: AtomicI64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_entry_id: AtomicI64::new(1),
            next_version_id: AtomicI64::new(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    /// Entry as seen from inside the snapshot: buffered copy first, then
    /// committed state.
    fn entry_view(
        &self,
        snapshot: &MemorySnapshot,
        entry_id: Id,
    ) -> Result<EntryRecord, StorageError> {
        if let Some(e) = snapshot.entries.get(&entry_id) {
            return Ok(e.clone());
        }
        self.lock()?
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                reference: entry_id.to_string(),
            })
    }

    fn version_view(
        &self,
        snapshot: &MemorySnapshot,
        id: Id,
    ) -> Result<FormVersionRecord, StorageError> {
        if let Some(v) = snapshot.form_versions.get(&id) {
            return Ok(v.clone());
        }
        self.lock()?
            .form_versions
            .get(&id)
            .cloned()
            .ok_or(StorageError::FormVersionNotFound { id })
    }

    /// Remember the committed version of an existing entry the first time
    /// the snapshot touches it.
    fn expect(snapshot: &mut MemorySnapshot, entry: &EntryRecord) {
        if snapshot.new_entries.contains(&entry.id) {
            return;
        }
        snapshot
            .expectations
            .entry(entry.id)
            .or_insert(entry.version);
    }

    fn bump_id(counter: &AtomicI64, at_least: Id) {
        counter.fetch_max(at_least + 1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FormStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut state = self.lock()?;

        for (entry_id, expected) in &snapshot.expectations {
            let current = state.entries.get(entry_id).map(|e| e.version);
            if current != Some(*expected) {
                tracing::debug!(entry_id, expected, ?current, "commit rejected by version check");
                return Err(StorageError::ConcurrentConflict {
                    entry_id: *entry_id,
                    expected_version: *expected,
                });
            }
        }
        for id in &snapshot.new_form_versions {
            if state.form_versions.contains_key(id) {
                return Err(StorageError::FormVersionExists { id: *id });
            }
        }

        state.form_versions.extend(snapshot.form_versions);
        state.entries.extend(snapshot.entries);
        state.values.extend(snapshot.values);
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_entry(
        &self,
        snapshot: &mut MemorySnapshot,
        entry: NewEntry,
    ) -> Result<EntryRecord, StorageError> {
        let id = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
        let record = EntryRecord {
            id,
            form_version_id: entry.form_version_id,
            current_stage_id: entry.current_stage_id,
            is_complete: false,
            is_considered: false,
            public_identifier: entry.public_identifier,
            created_by: entry.created_by,
            updated_at: entry.created_at.clone(),
            created_at: entry.created_at,
            version: 0,
        };
        snapshot.new_entries.insert(id);
        snapshot.entries.insert(id, record.clone());
        Ok(record)
    }

    async fn get_entry_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        public_identifier: &str,
    ) -> Result<EntryRecord, StorageError> {
        let buffered = snapshot
            .entries
            .values()
            .find(|e| e.public_identifier == public_identifier)
            .cloned();
        let entry = match buffered {
            Some(e) => e,
            None => self.get_entry_by_public_identifier(public_identifier).await?,
        };
        Self::expect(snapshot, &entry);
        Ok(entry)
    }

    async fn update_entry_progress(
        &self,
        snapshot: &mut MemorySnapshot,
        entry_id: Id,
        expected_version: i64,
        progress: EntryProgress,
    ) -> Result<i64, StorageError> {
        let mut entry = self.entry_view(snapshot, entry_id)?;
        if entry.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                entry_id,
                expected_version,
            });
        }
        if entry.is_complete {
            return Err(StorageError::EntryFrozen { entry_id });
        }
        Self::expect(snapshot, &entry);

        entry.current_stage_id = progress.current_stage_id;
        entry.is_complete = progress.is_complete;
        entry.updated_at = progress.updated_at;
        entry.version += 1;
        let new_version = entry.version;
        snapshot.entries.insert(entry_id, entry);
        Ok(new_version)
    }

    async fn upsert_entry_value(
        &self,
        snapshot: &mut MemorySnapshot,
        value: EntryValueRecord,
    ) -> Result<(), StorageError> {
        let entry = self.entry_view(snapshot, value.entry_id)?;
        if entry.is_complete {
            return Err(StorageError::EntryFrozen { entry_id: entry.id });
        }
        snapshot
            .values
            .insert((value.entry_id, value.field_id), value.value);
        Ok(())
    }

    async fn set_considered(
        &self,
        snapshot: &mut MemorySnapshot,
        entry_ids: &[Id],
        is_considered: bool,
    ) -> Result<usize, StorageError> {
        let mut changed = 0;
        for &entry_id in entry_ids {
            let mut entry = self.entry_view(snapshot, entry_id)?;
            if entry.is_considered == is_considered {
                continue;
            }
            Self::expect(snapshot, &entry);
            entry.is_considered = is_considered;
            entry.version += 1;
            snapshot.entries.insert(entry_id, entry);
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_form_version(
        &self,
        snapshot: &mut MemorySnapshot,
        version: NewFormVersion,
    ) -> Result<FormVersionRecord, StorageError> {
        let id = match version.id {
            Some(id) => {
                let taken = snapshot.form_versions.contains_key(&id)
                    || self.lock()?.form_versions.contains_key(&id);
                if taken {
                    return Err(StorageError::FormVersionExists { id });
                }
                Self::bump_id(&self.next_version_id, id);
                id
            }
            None => self.next_version_id.fetch_add(1, Ordering::SeqCst),
        };

        let mut document = version.document;
        document.id = id;
        document.form_id = version.form_id;
        document.version_number = version.version_number;
        document.status = version.status;

        let record = FormVersionRecord {
            id,
            form_id: version.form_id,
            version_number: version.version_number,
            status: version.status,
            published_at: None,
            document,
        };
        snapshot.new_form_versions.insert(id);
        snapshot.form_versions.insert(id, record.clone());
        Ok(record)
    }

    async fn update_draft_document(
        &self,
        snapshot: &mut MemorySnapshot,
        id: Id,
        document: FormVersionDoc,
    ) -> Result<(), StorageError> {
        let mut record = self.version_view(snapshot, id)?;
        if record.status != VersionStatus::Draft {
            return Err(StorageError::VersionNotDraft {
                id,
                status: record.status,
            });
        }
        record.document = FormVersionDoc {
            id,
            form_id: record.form_id,
            version_number: record.version_number,
            status: VersionStatus::Draft,
            ..document
        };
        snapshot.form_versions.insert(id, record);
        Ok(())
    }

    async fn publish_form_version(
        &self,
        snapshot: &mut MemorySnapshot,
        id: Id,
        published_at: &str,
    ) -> Result<FormVersionRecord, StorageError> {
        let mut record = self.version_view(snapshot, id)?;
        if record.status != VersionStatus::Draft {
            return Err(StorageError::VersionNotDraft {
                id,
                status: record.status,
            });
        }

        let sibling_ids: BTreeSet<Id> = {
            let state = self.lock()?;
            state
                .form_versions
                .values()
                .chain(snapshot.form_versions.values())
                .filter(|v| v.form_id == record.form_id && v.id != id)
                .map(|v| v.id)
                .collect()
        };
        for sibling_id in sibling_ids {
            let mut sibling = self.version_view(snapshot, sibling_id)?;
            if sibling.status == VersionStatus::Published {
                sibling.status = VersionStatus::Draft;
                sibling.document.status = VersionStatus::Draft;
                snapshot.form_versions.insert(sibling_id, sibling);
            }
        }

        record.status = VersionStatus::Published;
        record.document.status = VersionStatus::Published;
        record.published_at = Some(published_at.to_string());
        snapshot.form_versions.insert(id, record.clone());
        Ok(record)
    }

    async fn get_form_version(&self, id: Id) -> Result<FormVersionRecord, StorageError> {
        self.lock()?
            .form_versions
            .get(&id)
            .cloned()
            .ok_or(StorageError::FormVersionNotFound { id })
    }

    async fn list_form_versions(
        &self,
        form_id: Option<Id>,
        status: Option<VersionStatus>,
    ) -> Result<Vec<FormVersionRecord>, StorageError> {
        let state = self.lock()?;
        let mut versions: Vec<FormVersionRecord> = state
            .form_versions
            .values()
            .filter(|v| form_id.map_or(true, |f| v.form_id == f))
            .filter(|v| status.map_or(true, |s| v.status == s))
            .cloned()
            .collect();
        versions.sort_by_key(|v| (v.form_id, v.version_number));
        Ok(versions)
    }

    async fn get_entry(&self, entry_id: Id) -> Result<EntryRecord, StorageError> {
        self.lock()?
            .entries
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                reference: entry_id.to_string(),
            })
    }

    async fn get_entry_by_public_identifier(
        &self,
        public_identifier: &str,
    ) -> Result<EntryRecord, StorageError> {
        self.lock()?
            .entries
            .values()
            .find(|e| e.public_identifier == public_identifier)
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                reference: public_identifier.to_string(),
            })
    }

    async fn list_entry_values(&self, entry_id: Id) -> Result<Vec<EntryValueRecord>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .values
            .range((entry_id, Id::MIN)..=(entry_id, Id::MAX))
            .map(|((entry_id, field_id), value)| EntryValueRecord {
                entry_id: *entry_id,
                field_id: *field_id,
                value: value.clone(),
            })
            .collect())
    }

    async fn value_exists(
        &self,
        field_id: Id,
        value: &str,
        exclude_entry_id: Option<Id>,
    ) -> Result<bool, StorageError> {
        let state = self.lock()?;
        Ok(state.values.iter().any(|((e, f), v)| {
            *f == field_id && v == value && Some(*e) != exclude_entry_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formflow_interchange::StageDoc;

    fn doc() -> FormVersionDoc {
        FormVersionDoc {
            id: 0,
            form_id: 0,
            form_name: "Intake".to_string(),
            version_number: 0,
            status: VersionStatus::Draft,
            stages: vec![StageDoc {
                id: 1,
                name: "Start".to_string(),
                is_initial: true,
                order: 1,
                visibility_condition: None,
                access_policy: None,
                sections: vec![],
            }],
            transitions: vec![],
        }
    }

    fn new_entry(public_identifier: &str) -> NewEntry {
        NewEntry {
            form_version_id: 1,
            current_stage_id: 1,
            public_identifier: public_identifier.to_string(),
            created_by: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_form_version_overwrites_document_identity() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        let rec = s
            .insert_form_version(
                &mut snap,
                NewFormVersion {
                    id: Some(7),
                    form_id: 3,
                    version_number: 2,
                    status: VersionStatus::Published,
                    document: doc(),
                },
            )
            .await
            .unwrap();
        s.commit_snapshot(snap).await.unwrap();

        assert_eq!(rec.document.id, 7);
        assert_eq!(rec.document.form_id, 3);
        assert_eq!(rec.document.status, VersionStatus::Published);

        // Explicit ids advance the allocator.
        let mut snap = s.begin_snapshot().await.unwrap();
        let next = s
            .insert_form_version(
                &mut snap,
                NewFormVersion {
                    id: None,
                    form_id: 3,
                    version_number: 3,
                    status: VersionStatus::Draft,
                    document: doc(),
                },
            )
            .await
            .unwrap();
        assert_eq!(next.id, 8);
    }

    #[tokio::test]
    async fn values_listed_per_entry_in_field_order() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        let a = s.insert_entry(&mut snap, new_entry("a")).await.unwrap();
        let b = s.insert_entry(&mut snap, new_entry("b")).await.unwrap();
        for (entry_id, field_id, value) in [(a.id, 20, "x"), (a.id, 10, "y"), (b.id, 10, "z")] {
            s.upsert_entry_value(
                &mut snap,
                EntryValueRecord {
                    entry_id,
                    field_id,
                    value: value.to_string(),
                },
            )
            .await
            .unwrap();
        }
        s.commit_snapshot(snap).await.unwrap();

        let values = s.list_entry_values(a.id).await.unwrap();
        let fields: Vec<Id> = values.iter().map(|v| v.field_id).collect();
        assert_eq!(fields, vec![10, 20]);
        assert!(s.value_exists(10, "z", Some(a.id)).await.unwrap());
        assert!(!s.value_exists(10, "z", Some(b.id)).await.unwrap());
    }

    #[tokio::test]
    async fn set_considered_skips_unchanged_entries() {
        let s = MemoryStorage::new();
        let mut snap = s.begin_snapshot().await.unwrap();
        let a = s.insert_entry(&mut snap, new_entry("a")).await.unwrap();
        s.commit_snapshot(snap).await.unwrap();

        let mut snap = s.begin_snapshot().await.unwrap();
        assert_eq!(s.set_considered(&mut snap, &[a.id], true).await.unwrap(), 1);
        assert_eq!(s.set_considered(&mut snap, &[a.id], true).await.unwrap(), 0);
        s.commit_snapshot(snap).await.unwrap();

        let stored = s.get_entry(a.id).await.unwrap();
        assert!(stored.is_considered);
        assert_eq!(stored.version, 1);
    }
}
