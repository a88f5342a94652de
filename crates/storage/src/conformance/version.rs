use std::future::Future;

use super::{make_value, seed_entry, TestResult};
use crate::{EntryProgress, FormStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "progress_increments_version",
        progress_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_expected_version_rejected",
        stale_expected_version_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "interleaved_snapshots_second_commit_conflicts",
        interleaved_snapshots_second_commit_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "completed_entry_is_frozen",
        completed_entry_is_frozen(factory).await,
    ));

    results
}

fn progress(stage: i64, complete: bool) -> EntryProgress {
    EntryProgress {
        current_stage_id: stage,
        is_complete: complete,
        updated_at: "2026-01-02T00:00:00Z".to_string(),
    }
}

async fn progress_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;

    for (expected, stage) in [(0, 2), (1, 3)] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let read = s
            .get_entry_for_update(&mut snap, "pub-1")
            .await
            .map_err(|e| e.to_string())?;
        if read.version != expected {
            return Err(format!("expected version {expected}, read {}", read.version));
        }
        s.update_entry_progress(&mut snap, entry.id, read.version, progress(stage, false))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let stored = s.get_entry(entry.id).await.map_err(|e| e.to_string())?;
    if stored.version != 2 || stored.current_stage_id != 3 {
        return Err(format!("unexpected entry after two moves: {stored:?}"));
    }
    Ok(())
}

async fn stale_expected_version_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_entry_progress(&mut snap, entry.id, 5, progress(2, false))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match result {
        Err(StorageError::ConcurrentConflict {
            entry_id,
            expected_version: 5,
        }) if entry_id == entry.id => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

/// Two snapshots read the same entry at version 0. The first commits; the
/// second must be rejected and leave nothing behind.
async fn interleaved_snapshots_second_commit_conflicts<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;

    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let a = s
        .get_entry_for_update(&mut first, "pub-1")
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .get_entry_for_update(&mut second, "pub-1")
        .await
        .map_err(|e| e.to_string())?;

    s.update_entry_progress(&mut first, entry.id, a.version, progress(2, false))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(first).await.map_err(|e| e.to_string())?;

    // The second snapshot may be rejected at update time or at commit time.
    let outcome = match s
        .update_entry_progress(&mut second, entry.id, b.version, progress(3, true))
        .await
    {
        Ok(_) => {
            s.upsert_entry_value(&mut second, make_value(entry.id, 10, "late"))
                .await
                .map_err(|e| e.to_string())?;
            s.commit_snapshot(second).await
        }
        Err(e) => {
            s.abort_snapshot(second).await.map_err(|e| e.to_string())?;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let stored = s.get_entry(entry.id).await.map_err(|e| e.to_string())?;
    if stored.current_stage_id != 2 || stored.is_complete {
        return Err(format!("losing snapshot leaked into entry: {stored:?}"));
    }
    let late = s
        .value_exists(10, "late", None)
        .await
        .map_err(|e| e.to_string())?;
    if late {
        return Err("losing snapshot leaked a value".to_string());
    }
    Ok(())
}

async fn completed_entry_is_frozen<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entry_progress(&mut snap, entry.id, 0, progress(1, true))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let moved = s
        .update_entry_progress(&mut snap, entry.id, 1, progress(2, false))
        .await;
    match moved {
        Err(StorageError::EntryFrozen { .. }) => {}
        other => return Err(format!("expected EntryFrozen on progress, got {other:?}")),
    }
    let written = s
        .upsert_entry_value(&mut snap, make_value(entry.id, 10, "after"))
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match written {
        Err(StorageError::EntryFrozen { .. }) => Ok(()),
        other => Err(format!("expected EntryFrozen on value, got {other:?}")),
    }
}
