//! Token gate: bearer-token middleware for protected routes.

use crate::error::ServerError;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// The user a request was authenticated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
}

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or_else(|| ServerError::Unauthenticated("no authenticated user".to_string()))
    }
}

/// Bearer token from the Authorization header. `Some("")` for a header
/// present in the wrong scheme.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or("").trim())
}

/// Resolve the bearer token to a [`Principal`] or reject the call. Every
/// guarded call is logged with its method, path, duration and outcome.
pub async fn token_gate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    tracing::info!(%method, %path, "request started");

    let resolved = match bearer_token(request.headers()) {
        None => Err(ServerError::Unauthenticated(
            "metadata is not provided".to_string(),
        )),
        Some(token) => state.auth.validate_token(token),
    };

    let user_id = match resolved {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(
                %method,
                %path,
                duration_ms = started.elapsed().as_millis() as u64,
                error = %e,
                "request failed"
            );
            return Err(e);
        }
    };

    request.extensions_mut().insert(Principal { user_id });
    let response = next.run(request).await;

    let duration_ms = started.elapsed().as_millis() as u64;
    let status = response.status();
    if status.is_success() {
        tracing::info!(%method, %path, user_id, duration_ms, status = status.as_u16(), "request completed");
    } else {
        tracing::warn!(%method, %path, user_id, duration_ms, status = status.as_u16(), "request failed");
    }
    Ok(response)
}
