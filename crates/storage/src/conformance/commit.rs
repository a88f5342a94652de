use std::future::Future;

use super::{make_new_entry, make_value, TestResult};
use crate::{EntryProgress, FormStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "commit_applies_entry_values_and_progress_together",
        commit_applies_entry_values_and_progress_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "abort_discards_everything",
        abort_discards_everything(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "dropped_snapshot_discards_everything",
        dropped_snapshot_discards_everything(factory).await,
    ));

    results
}

/// The initial-submission shape: entry, values and the completion flag land
/// in one commit.
async fn commit_applies_entry_values_and_progress_together<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    for (field_id, value) in [(10, "Ada"), (11, "ada@example.com")] {
        s.upsert_entry_value(&mut snap, make_value(entry.id, field_id, value))
            .await
            .map_err(|e| e.to_string())?;
    }
    let new_version = s
        .update_entry_progress(
            &mut snap,
            entry.id,
            0,
            EntryProgress {
                current_stage_id: 1,
                is_complete: true,
                updated_at: "2026-01-01T00:00:05Z".to_string(),
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    if new_version != 1 {
        return Err(format!("expected version 1, got {new_version}"));
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stored = s.get_entry(entry.id).await.map_err(|e| e.to_string())?;
    if !stored.is_complete || stored.version != 1 {
        return Err(format!("unexpected stored entry: {stored:?}"));
    }
    if stored.updated_at != "2026-01-01T00:00:05Z" {
        return Err(format!("updated_at not applied: {}", stored.updated_at));
    }
    let values = s
        .list_entry_values(entry.id)
        .await
        .map_err(|e| e.to_string())?;
    if values.len() != 2 {
        return Err(format!("expected 2 values, got {}", values.len()));
    }
    Ok(())
}

async fn abort_discards_everything<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.upsert_entry_value(&mut snap, make_value(entry.id, 10, "x"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    match s.get_entry_by_public_identifier("pub-1").await {
        Err(StorageError::EntryNotFound { .. }) => {}
        other => return Err(format!("expected EntryNotFound after abort, got {other:?}")),
    }
    let exists = s
        .value_exists(10, "x", None)
        .await
        .map_err(|e| e.to_string())?;
    if exists {
        return Err("aborted value is visible".to_string());
    }
    Ok(())
}

async fn dropped_snapshot_discards_everything<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.insert_entry(&mut snap, make_new_entry(1, "pub-dropped"))
            .await
            .map_err(|e| e.to_string())?;
    }
    match s.get_entry_by_public_identifier("pub-dropped").await {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntryNotFound after drop, got {other:?}")),
    }
}
