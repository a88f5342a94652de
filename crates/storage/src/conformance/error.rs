use std::future::Future;

use super::{make_value, TestResult};
use crate::{create_next_version, EntryProgress, FormStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_entry_nonexistent",
        get_entry_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_entry_for_update_not_found_has_reference",
        get_entry_for_update_not_found_has_reference(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_progress_nonexistent",
        update_progress_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "upsert_value_nonexistent_entry",
        upsert_value_nonexistent_entry(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_form_version_nonexistent",
        get_form_version_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "next_version_of_unknown_form",
        next_version_of_unknown_form(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_entry_values_empty_for_nonexistent",
        list_entry_values_empty_for_nonexistent(factory).await,
    ));

    results
}

async fn get_entry_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_entry(999).await {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntryNotFound, got {:?}", other)),
    }
}

async fn get_entry_for_update_not_found_has_reference<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_entry_for_update(&mut snap, "missing-pub").await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::EntryNotFound { reference }) if reference == "missing-pub" => Ok(()),
        other => Err(format!(
            "expected EntryNotFound {{ reference: \"missing-pub\" }}, got {:?}",
            other
        )),
    }
}

async fn update_progress_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_entry_progress(
            &mut snap,
            999,
            0,
            EntryProgress {
                current_stage_id: 1,
                is_complete: false,
                updated_at: "2026-01-01T00:00:00Z".to_string(),
            },
        )
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntryNotFound, got {:?}", other)),
    }
}

async fn upsert_value_nonexistent_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.upsert_entry_value(&mut snap, make_value(999, 1, "x")).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntryNotFound, got {:?}", other)),
    }
}

async fn get_form_version_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_form_version(404).await {
        Err(StorageError::FormVersionNotFound { id: 404 }) => Ok(()),
        other => Err(format!("expected FormVersionNotFound, got {:?}", other)),
    }
}

async fn next_version_of_unknown_form<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = create_next_version(&s, &mut snap, 77, true).await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::FormNotFound { form_id: 77 }) => Ok(()),
        other => Err(format!("expected FormNotFound, got {:?}", other)),
    }
}

async fn list_entry_values_empty_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let values = s.list_entry_values(999).await.map_err(|e| e.to_string())?;
    if !values.is_empty() {
        return Err(format!("expected no values, got {}", values.len()));
    }
    Ok(())
}
