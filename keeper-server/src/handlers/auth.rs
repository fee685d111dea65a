//! Registration and token issuance handlers.

use crate::accounts::AuthService;
use crate::error::ServerError;
use crate::server::AppState;
use axum::extract::State;
use axum::Json;
use keeper_core::sync::models::{AuthResponse, LoginRequest, RegisterResponse};

/// Password hashing is CPU bound, so it runs off the async executor.
async fn blocking<T, F>(auth: AuthService, f: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&AuthService) -> Result<T, ServerError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&auth))
        .await
        .map_err(|e| ServerError::Internal(format!("auth task failed: {}", e)))?
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<RegisterResponse>, ServerError> {
    let user_id = blocking(state.auth, move |auth| auth.register(&req.login, &req.password)).await?;
    Ok(Json(RegisterResponse {
        user_id,
        message: "register completed".to_string(),
    }))
}

pub async fn auth(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let token = blocking(state.auth, move |auth| auth.login(&req.login, &req.password)).await?;
    Ok(Json(AuthResponse {
        token,
        message: "token created".to_string(),
    }))
}
