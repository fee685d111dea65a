//! Direct per-type write, delete and list handlers.

use crate::auth::Principal;
use crate::error::ServerError;
use crate::server::AppState;
use crate::storage::secrets;
use axum::extract::State;
use axum::Json;
use keeper_core::sync::models::{DeleteRequest, MessageResponse};
use keeper_core::{Secret, SecretRecord};
use serde::Serialize;

/// A live secret as returned by the list endpoint.
#[derive(Debug, Serialize)]
pub struct SecretView<P> {
    pub id: i64,
    #[serde(flatten)]
    pub payload: P,
    pub updated_at: String,
}

impl<P: Secret> From<SecretRecord<P>> for SecretView<P> {
    fn from(record: SecretRecord<P>) -> Self {
        Self {
            id: record.id,
            updated_at: record.updated_at_utc().to_rfc3339(),
            payload: record.payload,
        }
    }
}

pub async fn save<P: Secret>(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<P>,
) -> Result<Json<MessageResponse>, ServerError> {
    payload.validate()?;

    let conn = state.storage.conn()?;
    let id = secrets::upsert(&conn, principal.user_id, &payload)?;
    tracing::debug!(kind = P::table(), id, user_id = principal.user_id, "Secret saved");

    Ok(Json(MessageResponse {
        message: format!("{} saved", P::KIND),
    }))
}

pub async fn delete<P: Secret>(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<MessageResponse>, ServerError> {
    if req.key.is_empty() {
        return Err(ServerError::InvalidArgument(format!(
            "{} is required",
            P::key_column()
        )));
    }

    let conn = state.storage.conn()?;
    if !secrets::soft_delete_by_key::<P>(&conn, principal.user_id, &req.key)? {
        tracing::debug!(kind = P::table(), user_id = principal.user_id, "Secret already deleted");
    }

    Ok(Json(MessageResponse {
        message: format!("{} deleted", P::KIND),
    }))
}

pub async fn list<P: Secret>(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<Vec<SecretView<P>>>, ServerError> {
    let conn = state.storage.conn()?;
    let records = secrets::list_live::<P>(&conn, principal.user_id)?;
    Ok(Json(records.into_iter().map(SecretView::from).collect()))
}
