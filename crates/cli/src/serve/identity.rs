//! Caller identity from request headers.
//!
//! Authentication happens upstream; the proxy in front of the API forwards
//! the authenticated user as `X-User-*` headers. Without `X-User-Id` the
//! caller is a guest.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use formflow_engine::Identity;
use formflow_interchange::Id;

use super::json_error;

pub(crate) struct Caller(pub(crate) Option<Identity>);

impl Caller {
    pub(crate) fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers)
            .map(Caller)
            .map_err(|msg| json_error(StatusCode::BAD_REQUEST, &msg).into_response())
    }
}

pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<Option<Identity>, String> {
    let Some(id) = header(headers, "x-user-id")? else {
        return Ok(None);
    };
    let id: Id = parse_id("x-user-id", &id)?;
    let mut identity = Identity::new(id, header(headers, "x-user-email")?.unwrap_or_default());
    identity.name = header(headers, "x-user-name")?.unwrap_or_default();
    identity.roles = id_list(headers, "x-user-roles")?;
    identity.permissions = id_list(headers, "x-user-permissions")?;
    identity.default_language_id = header(headers, "x-user-language")?
        .map(|v| parse_id("x-user-language", &v))
        .transpose()?;
    Ok(Some(identity))
}

fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, String> {
    match headers.get(name) {
        None => Ok(None),
        Some(v) => {
            let text = v
                .to_str()
                .map_err(|_| format!("header {} is not valid text", name))?
                .trim();
            Ok((!text.is_empty()).then(|| text.to_string()))
        }
    }
}

fn parse_id(name: &str, value: &str) -> Result<Id, String> {
    value
        .parse()
        .map_err(|_| format!("header {}: '{}' is not an id", name, value))
}

/// Comma-separated ids.
fn id_list(headers: &HeaderMap, name: &str) -> Result<Vec<Id>, String> {
    let Some(raw) = header(headers, name)? else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_id(name, s))
        .collect()
}
