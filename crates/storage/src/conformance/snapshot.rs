use std::future::Future;

use super::{make_new_entry, make_value, seed_entry, TestResult};
use crate::{FormStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_entry_invisible",
        uncommitted_entry_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_value_invisible",
        uncommitted_value_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_reads_its_own_writes",
        snapshot_reads_its_own_writes(factory).await,
    ));

    results
}

async fn uncommitted_entry_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let entry = s
        .insert_entry(&mut snap, make_new_entry(1, "pub-1"))
        .await
        .map_err(|e| e.to_string())?;

    match s.get_entry(entry.id).await {
        Err(StorageError::EntryNotFound { .. }) => {}
        other => return Err(format!("expected EntryNotFound before commit, got {other:?}")),
    }

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    s.get_entry(entry.id)
        .await
        .map_err(|e| format!("entry missing after commit: {e}"))?;
    Ok(())
}

async fn uncommitted_value_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_entry_value(&mut snap, make_value(entry.id, 10, "draft"))
        .await
        .map_err(|e| e.to_string())?;

    let visible = s
        .value_exists(10, "draft", None)
        .await
        .map_err(|e| e.to_string())?;
    if visible {
        return Err("uncommitted value leaked into value_exists".to_string());
    }
    let values = s
        .list_entry_values(entry.id)
        .await
        .map_err(|e| e.to_string())?;
    if !values.is_empty() {
        return Err(format!("uncommitted value leaked: {values:?}"));
    }
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// An entry created inside a snapshot can be read for update and advanced
/// before the snapshot commits.
async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let created = s
        .insert_entry(&mut snap, make_new_entry(1, "pub-own"))
        .await
        .map_err(|e| e.to_string())?;
    let read = s
        .get_entry_for_update(&mut snap, "pub-own")
        .await
        .map_err(|e| format!("read own write: {e}"))?;
    if read.id != created.id {
        return Err(format!("expected entry {}, got {}", created.id, read.id));
    }
    s.upsert_entry_value(&mut snap, make_value(created.id, 10, "v"))
        .await
        .map_err(|e| format!("value on own entry: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(())
}
