//! `formflow serve`: HTTP JSON API over the submission engine.
//!
//! Endpoints:
//! - GET  /health                          - Server status
//! - GET  /forms                           - Published forms the caller may start
//! - GET  /forms/{id}                      - Initial-stage structure of a form version
//! - POST /forms/{id}/entries              - Initial submission
//! - GET  /entries/{public_identifier}     - Entry with its stages so far
//! - POST /entries/{public_identifier}     - Later-stage submission
//! - POST /entries/considered              - Set the reviewer flag on entries
//!
//! The caller is taken from `X-User-*` headers (see [`identity`]); read
//! paths accept `?language_id=`. All responses use Content-Type:
//! application/json, errors as `{"error": "..."}`.

mod handlers;
mod identity;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use formflow_engine::SubmissionError;
use tower_http::cors::{Any, CorsLayer};

use self::handlers::{
    handle_form_structure, handle_get_entry, handle_health, handle_list_forms, handle_not_found,
    handle_set_considered, handle_submit_initial, handle_submit_later,
};
use self::state::AppState;
use crate::config::Config;

/// Maximum request body size: 25 MB, uploads arrive base64-encoded.
const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Engine errors as HTTP responses.
pub(crate) struct ApiError(SubmissionError);

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        match self.0 {
            SubmissionError::Validation(errors) => {
                let body = serde_json::json!({
                    "error": "validation failed",
                    "errors": errors,
                });
                (status, Json(body)).into_response()
            }
            SubmissionError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                json_error(status, "internal error").into_response()
            }
            other => json_error(status, &other.to_string()).into_response(),
        }
    }
}

fn status_for(e: &SubmissionError) -> StatusCode {
    match e {
        SubmissionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SubmissionError::AccessDenied(_) => StatusCode::FORBIDDEN,
        SubmissionError::NotFound(_) => StatusCode::NOT_FOUND,
        SubmissionError::AlreadyComplete | SubmissionError::Conflict => StatusCode::CONFLICT,
        SubmissionError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
        SubmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/forms", get(handle_list_forms))
        .route("/forms/{id}", get(handle_form_structure))
        .route("/forms/{id}/entries", post(handle_submit_initial))
        .route("/entries/considered", post(handle_set_considered))
        .route(
            "/entries/{public_identifier}",
            get(handle_get_entry).post(handle_submit_later),
        )
        .fallback(handle_not_found)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Build the engine from `config` and serve until Ctrl+C.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_config(&config).await?);
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "formflow listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
