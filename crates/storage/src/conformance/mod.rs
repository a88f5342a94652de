//! Conformance test suite for `FormStorage` implementations.
//!
//! A backend-agnostic test suite that any `FormStorage` implementation can
//! run to verify correctness. The suite covers:
//!
//! - **Entries**: creation defaults, value upserts, uniqueness lookups
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics, aborts leave no trace
//! - **Version validation / OCC**: stale versions rejected, completed entries frozen
//! - **Form-version lifecycle**: publish demotion, draft-only mutation, next version
//! - **Error handling**: correct error variants for missing records
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use formflow_storage::conformance::{run_conformance_suite, ConformanceReport};
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod entry;
mod error;
mod lifecycle;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use formflow_interchange::{FormVersionDoc, SectionDoc, StageDoc, VersionStatus};

use crate::record::{EntryValueRecord, NewEntry, NewFormVersion};
use crate::FormStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "entry", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_entry_starts_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(entry::run_entry_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(lifecycle::run_lifecycle_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_new_entry(form_version_id: i64, public_identifier: &str) -> NewEntry {
    NewEntry {
        form_version_id,
        current_stage_id: 1,
        public_identifier: public_identifier.to_string(),
        created_by: Some(42),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn make_value(entry_id: i64, field_id: i64, value: &str) -> EntryValueRecord {
    EntryValueRecord {
        entry_id,
        field_id,
        value: value.to_string(),
    }
}

fn make_document(form_name: &str) -> FormVersionDoc {
    FormVersionDoc {
        id: 0,
        form_id: 0,
        form_name: form_name.to_string(),
        version_number: 0,
        status: VersionStatus::Draft,
        stages: vec![
            StageDoc {
                id: 1,
                name: "Request".to_string(),
                is_initial: true,
                order: 1,
                visibility_condition: None,
                access_policy: None,
                sections: vec![SectionDoc {
                    id: 1,
                    name: "Details".to_string(),
                    order: 1,
                    visibility_condition: None,
                    fields: vec![],
                }],
            },
            StageDoc {
                id: 2,
                name: "Review".to_string(),
                is_initial: false,
                order: 2,
                visibility_condition: None,
                access_policy: None,
                sections: vec![],
            },
        ],
        transitions: vec![],
    }
}

fn make_new_version(form_id: i64, version_number: i64, status: VersionStatus) -> NewFormVersion {
    NewFormVersion {
        id: None,
        form_id,
        version_number,
        status,
        document: make_document("Leave request"),
    }
}

/// Insert and commit one entry, returning the stored record.
async fn seed_entry<S: FormStorage>(
    storage: &S,
    public_identifier: &str,
) -> Result<crate::EntryRecord, String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let entry = storage
        .insert_entry(&mut snap, make_new_entry(1, public_identifier))
        .await
        .map_err(|e| format!("insert_entry: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))?;
    Ok(entry)
}
