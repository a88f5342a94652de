use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use super::{make_new_entry, seed_entry, TestResult};
use crate::{EntryProgress, FormStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_submissions_exactly_one_wins",
        concurrent_submissions_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_entries_all_succeed",
        concurrent_updates_different_entries_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_get_distinct_ids",
        concurrent_inserts_get_distinct_ids(factory).await,
    ));

    results
}

/// Read the entry, move it, commit. Returns `Ok(true)` on a win and
/// `Ok(false)` when the OCC check rejected this task.
async fn advance<S: FormStorage>(
    s: &S,
    public_identifier: &str,
    to_stage: i64,
) -> Result<bool, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let entry = s.get_entry_for_update(&mut snap, public_identifier).await?;
    let progress = EntryProgress {
        current_stage_id: to_stage,
        is_complete: false,
        updated_at: "2026-01-03T00:00:00Z".to_string(),
    };
    let updated = s
        .update_entry_progress(&mut snap, entry.id, entry.version, progress)
        .await;
    match updated {
        Ok(_) => {}
        Err(StorageError::ConcurrentConflict { .. }) => {
            s.abort_snapshot(snap).await?;
            return Ok(false);
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            return Err(e);
        }
    }
    match s.commit_snapshot(snap).await {
        Ok(()) => Ok(true),
        Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Concurrent submissions on one entry: exactly one wins ───────────────────

/// N tasks read the same entry at version 0 and race to advance it. Exactly
/// one commit succeeds; the rest must observe ConcurrentConflict.
async fn concurrent_submissions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let entry = seed_entry(storage.as_ref(), "pub-race").await?;

    // Take every read before any write so all tasks start from version 0.
    let mut snaps = Vec::new();
    for _ in 0..N {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let read = storage
            .get_entry_for_update(&mut snap, "pub-race")
            .await
            .map_err(|e| format!("read: {e}"))?;
        snaps.push((snap, read.version));
    }

    let mut handles = Vec::new();
    for (i, (mut snap, version)) in snaps.into_iter().enumerate() {
        let s = storage.clone();
        let entry_id = entry.id;
        handles.push(tokio::spawn(async move {
            let progress = EntryProgress {
                current_stage_id: 2 + i as i64,
                is_complete: false,
                updated_at: "2026-01-03T00:00:00Z".to_string(),
            };
            match s
                .update_entry_progress(&mut snap, entry_id, version, progress)
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            }
            match s.commit_snapshot(snap).await {
                Ok(()) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let stored = storage
        .get_entry(entry.id)
        .await
        .map_err(|e| e.to_string())?;
    if stored.version != 1 {
        return Err(format!("expected final version 1, got {}", stored.version));
    }
    Ok(())
}

// ── Concurrent updates to different entries: all succeed ────────────────────

/// N tasks each advance a different entry. No false conflicts when there is
/// no contention.
async fn concurrent_updates_different_entries_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed_entry(storage.as_ref(), &format!("pub-{i}")).await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            advance(s.as_ref(), &format!("pub-{i}"), 2).await
        }));
    }

    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if !won {
            return Err("uncontended update reported a conflict".to_string());
        }
    }
    Ok(())
}

async fn concurrent_inserts_get_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let entry = s
                .insert_entry(&mut snap, make_new_entry(1, &format!("pub-{i}")))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<_, StorageError>(entry.id)
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        ids.insert(id);
    }
    if ids.len() != N {
        return Err(format!("expected {N} distinct ids, got {}", ids.len()));
    }
    Ok(())
}
