use std::future::Future;

use super::{make_new_entry, make_value, seed_entry, TestResult};
use crate::FormStorage;

pub(super) async fn run_entry_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "entry",
        "insert_entry_starts_at_version_0",
        insert_entry_starts_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "entry",
        "insert_entry_allocates_distinct_ids",
        insert_entry_allocates_distinct_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "entry",
        "upsert_value_overwrites_previous",
        upsert_value_overwrites_previous(factory).await,
    ));
    results.push(TestResult::from_result(
        "entry",
        "value_exists_respects_exclusion",
        value_exists_respects_exclusion(factory).await,
    ));
    results.push(TestResult::from_result(
        "entry",
        "lookup_by_public_identifier",
        lookup_by_public_identifier(factory).await,
    ));

    results
}

/// A fresh entry is at version 0, not complete and not considered.
async fn insert_entry_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;
    let stored = s.get_entry(entry.id).await.map_err(|e| e.to_string())?;

    if stored.version != 0 {
        return Err(format!("expected version 0, got {}", stored.version));
    }
    if stored.is_complete || stored.is_considered {
        return Err(format!("expected fresh flags, got {stored:?}"));
    }
    if stored.created_at != stored.updated_at {
        return Err("updated_at should start equal to created_at".to_string());
    }
    if stored.created_by != Some(42) {
        return Err(format!("expected created_by 42, got {:?}", stored.created_by));
    }
    Ok(())
}

async fn insert_entry_allocates_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let a = s
        .insert_entry(&mut snap, make_new_entry(1, "pub-a"))
        .await
        .map_err(|e| e.to_string())?;
    let b = s
        .insert_entry(&mut snap, make_new_entry(1, "pub-b"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if a.id == b.id {
        return Err(format!("both entries got id {}", a.id));
    }
    Ok(())
}

async fn upsert_value_overwrites_previous<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;

    for value in ["first", "second"] {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        s.upsert_entry_value(&mut snap, make_value(entry.id, 10, value))
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    }

    let values = s
        .list_entry_values(entry.id)
        .await
        .map_err(|e| e.to_string())?;
    if values.len() != 1 {
        return Err(format!("expected one value row, got {}", values.len()));
    }
    if values[0].value != "second" {
        return Err(format!("expected 'second', got '{}'", values[0].value));
    }
    Ok(())
}

async fn value_exists_respects_exclusion<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.upsert_entry_value(&mut snap, make_value(entry.id, 10, "a@example.com"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let found = s
        .value_exists(10, "a@example.com", None)
        .await
        .map_err(|e| e.to_string())?;
    if !found {
        return Err("value should exist".to_string());
    }
    let excluded = s
        .value_exists(10, "a@example.com", Some(entry.id))
        .await
        .map_err(|e| e.to_string())?;
    if excluded {
        return Err("value should not exist once its own entry is excluded".to_string());
    }
    let other_field = s
        .value_exists(11, "a@example.com", None)
        .await
        .map_err(|e| e.to_string())?;
    if other_field {
        return Err("value lookup must be scoped to the field".to_string());
    }
    Ok(())
}

async fn lookup_by_public_identifier<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let entry = seed_entry(&s, "pub-xyz").await?;
    let found = s
        .get_entry_by_public_identifier("pub-xyz")
        .await
        .map_err(|e| e.to_string())?;
    if found.id != entry.id {
        return Err(format!("expected entry {}, got {}", entry.id, found.id));
    }
    Ok(())
}
