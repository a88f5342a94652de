use std::future::Future;

use formflow_interchange::VersionStatus;

use super::{make_document, make_new_version, TestResult};
use crate::{create_next_version, FormStorage, StorageError};

pub(super) async fn run_lifecycle_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "lifecycle",
        "publish_demotes_previous_published_version",
        publish_demotes_previous_published_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "lifecycle",
        "non_draft_versions_are_immutable",
        non_draft_versions_are_immutable(factory).await,
    ));
    results.push(TestResult::from_result(
        "lifecycle",
        "next_version_copies_structure",
        next_version_copies_structure(factory).await,
    ));
    results.push(TestResult::from_result(
        "lifecycle",
        "next_version_blank_has_one_initial_stage",
        next_version_blank_has_one_initial_stage(factory).await,
    ));
    results.push(TestResult::from_result(
        "lifecycle",
        "list_filters_by_status",
        list_filters_by_status(factory).await,
    ));

    results
}

async fn publish_demotes_previous_published_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let v1 = s
        .insert_form_version(&mut snap, make_new_version(5, 1, VersionStatus::Published))
        .await
        .map_err(|e| e.to_string())?;
    let v2 = s
        .insert_form_version(&mut snap, make_new_version(5, 2, VersionStatus::Draft))
        .await
        .map_err(|e| e.to_string())?;
    let other_form = s
        .insert_form_version(&mut snap, make_new_version(6, 1, VersionStatus::Published))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let published = s
        .publish_form_version(&mut snap, v2.id, "2026-02-01T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if published.published_at.as_deref() != Some("2026-02-01T00:00:00Z") {
        return Err(format!("published_at not set: {:?}", published.published_at));
    }
    let v1_now = s.get_form_version(v1.id).await.map_err(|e| e.to_string())?;
    if v1_now.status != VersionStatus::Draft {
        return Err(format!("previous version should be draft, is {}", v1_now.status));
    }
    let v2_now = s.get_form_version(v2.id).await.map_err(|e| e.to_string())?;
    if v2_now.status != VersionStatus::Published || v2_now.document.status != v2_now.status {
        return Err(format!("new version not published consistently: {}", v2_now.status));
    }
    let untouched = s
        .get_form_version(other_form.id)
        .await
        .map_err(|e| e.to_string())?;
    if untouched.status != VersionStatus::Published {
        return Err("publishing must not touch other forms".to_string());
    }
    Ok(())
}

async fn non_draft_versions_are_immutable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let v = s
        .insert_form_version(&mut snap, make_new_version(5, 1, VersionStatus::Archived))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let updated = s
        .update_draft_document(&mut snap, v.id, make_document("Renamed"))
        .await;
    match updated {
        Err(StorageError::VersionNotDraft {
            status: VersionStatus::Archived,
            ..
        }) => {}
        other => return Err(format!("expected VersionNotDraft on update, got {other:?}")),
    }
    let published = s
        .publish_form_version(&mut snap, v.id, "2026-02-01T00:00:00Z")
        .await;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    match published {
        Err(StorageError::VersionNotDraft { .. }) => Ok(()),
        other => Err(format!("expected VersionNotDraft on publish, got {other:?}")),
    }
}

async fn next_version_copies_structure<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_form_version(&mut snap, make_new_version(5, 1, VersionStatus::Published))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let next = create_next_version(&s, &mut snap, 5, true)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if next.version_number != 2 || next.status != VersionStatus::Draft {
        return Err(format!(
            "expected draft version 2, got {} {}",
            next.status, next.version_number
        ));
    }
    if next.document.stages.len() != 2 {
        return Err(format!("expected 2 copied stages, got {}", next.document.stages.len()));
    }
    if next.document.id != next.id {
        return Err("document id must match record id".to_string());
    }
    Ok(())
}

async fn next_version_blank_has_one_initial_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_form_version(&mut snap, make_new_version(5, 1, VersionStatus::Published))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let next = create_next_version(&s, &mut snap, 5, false)
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let stages = &next.document.stages;
    if stages.len() != 1 || !stages[0].is_initial || stages[0].sections.len() != 1 {
        return Err(format!("unexpected blank structure: {stages:?}"));
    }
    if next.document.form_name != "Leave request" {
        return Err("blank version should keep the form name".to_string());
    }
    Ok(())
}

async fn list_filters_by_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FormStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for (form_id, number, status) in [
        (5, 1, VersionStatus::Archived),
        (5, 2, VersionStatus::Published),
        (6, 1, VersionStatus::Draft),
    ] {
        s.insert_form_version(&mut snap, make_new_version(form_id, number, status))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let published = s
        .list_form_versions(None, Some(VersionStatus::Published))
        .await
        .map_err(|e| e.to_string())?;
    if published.len() != 1 || published[0].version_number != 2 {
        return Err(format!("unexpected published list: {published:?}"));
    }
    let form5 = s
        .list_form_versions(Some(5), None)
        .await
        .map_err(|e| e.to_string())?;
    let numbers: Vec<i64> = form5.iter().map(|v| v.version_number).collect();
    if numbers != vec![1, 2] {
        return Err(format!("expected versions [1, 2], got {numbers:?}"));
    }
    Ok(())
}
