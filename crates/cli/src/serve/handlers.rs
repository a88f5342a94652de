//! HTTP route handlers: forms, entries, submissions.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use formflow_interchange::Id;
use formflow_storage::{FormStorage, StorageError};
use serde::Deserialize;

use super::identity::Caller;
use super::state::AppState;
use super::{json_error, ApiError};
use crate::input::FieldValues;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LanguageQuery {
    #[serde(default, alias = "languageId")]
    language_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitBody {
    #[serde(default, alias = "fieldValues", alias = "field_values")]
    values: FieldValues,
    #[serde(default, alias = "stageTransitionId")]
    stage_transition_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsideredBody {
    #[serde(alias = "entryIds")]
    entry_ids: Vec<Id>,
    #[serde(alias = "isConsidered")]
    is_considered: bool,
}

fn bad_body(rejection: JsonRejection) -> Response {
    json_error(
        StatusCode::BAD_REQUEST,
        &format!("invalid request body: {}", rejection.body_text()),
    )
    .into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /forms
pub(crate) async fn handle_list_forms(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<LanguageQuery>,
) -> Result<Response, ApiError> {
    let forms = state
        .engine
        .accessible_forms(caller.identity(), query.language_id)
        .await?;
    Ok(Json(serde_json::json!({ "forms": forms })).into_response())
}

/// GET /forms/{id}
pub(crate) async fn handle_form_structure(
    State(state): State<Arc<AppState>>,
    Path(form_version_id): Path<Id>,
    caller: Caller,
    Query(query): Query<LanguageQuery>,
) -> Result<Response, ApiError> {
    let structure = state
        .engine
        .get_form_structure(form_version_id, caller.identity(), query.language_id)
        .await?;
    Ok(Json(structure).into_response())
}

/// POST /forms/{id}/entries
pub(crate) async fn handle_submit_initial(
    State(state): State<Arc<AppState>>,
    Path(form_version_id): Path<Id>,
    caller: Caller,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return Ok(bad_body(rejection)),
    };
    let values = match body.values.into_submitted() {
        Ok(v) => v,
        Err(msg) => return Ok(json_error(StatusCode::BAD_REQUEST, &msg).into_response()),
    };
    let outcome = state
        .engine
        .submit_initial(
            form_version_id,
            values,
            body.stage_transition_id,
            caller.identity(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

/// GET /entries/{public_identifier}
pub(crate) async fn handle_get_entry(
    State(state): State<Arc<AppState>>,
    Path(public_identifier): Path<String>,
    caller: Caller,
    Query(query): Query<LanguageQuery>,
) -> Result<Response, ApiError> {
    let entry = state
        .engine
        .get_entry_by_public_identifier(&public_identifier, caller.identity(), query.language_id)
        .await?;
    Ok(Json(entry).into_response())
}

/// POST /entries/{public_identifier}
pub(crate) async fn handle_submit_later(
    State(state): State<Arc<AppState>>,
    Path(public_identifier): Path<String>,
    caller: Caller,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return Ok(bad_body(rejection)),
    };
    let Some(transition_id) = body.stage_transition_id else {
        return Ok(
            json_error(StatusCode::BAD_REQUEST, "stage_transition_id is required").into_response(),
        );
    };
    let values = match body.values.into_submitted() {
        Ok(v) => v,
        Err(msg) => return Ok(json_error(StatusCode::BAD_REQUEST, &msg).into_response()),
    };
    let outcome = state
        .engine
        .submit_later_stage(&public_identifier, values, transition_id, caller.identity())
        .await?;
    Ok(Json(outcome).into_response())
}

/// POST /entries/considered
///
/// Reviewer flag; any authenticated caller may set it.
pub(crate) async fn handle_set_considered(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<ConsideredBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    if caller.identity().is_none() {
        return json_error(StatusCode::UNAUTHORIZED, "authentication required").into_response();
    }

    let storage = state.engine.storage();
    let result: Result<usize, StorageError> = async {
        let mut snapshot = storage.begin_snapshot().await?;
        match storage
            .set_considered(&mut snapshot, &body.entry_ids, body.is_considered)
            .await
        {
            Ok(changed) => {
                storage.commit_snapshot(snapshot).await?;
                Ok(changed)
            }
            Err(e) => {
                let _ = storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }
    .await;

    match result {
        Ok(changed) => {
            tracing::info!(
                entries = body.entry_ids.len(),
                changed,
                is_considered = body.is_considered,
                "reviewer flag updated"
            );
            Json(serde_json::json!({ "updated": changed })).into_response()
        }
        Err(e) => ApiError::from(formflow_engine::SubmissionError::from(e)).into_response(),
    }
}
