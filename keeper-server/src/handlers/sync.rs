//! Replication handlers, one route per secret kind.
//!
//! Every item is applied for the user its own access token resolves to.
//! Items succeed or fail independently; the response carries one outcome
//! per item in request order.

use crate::auth::Principal;
use crate::error::ServerError;
use crate::server::AppState;
use crate::storage::secrets;
use axum::extract::State;
use axum::Json;
use keeper_core::sync::models::{ItemOutcome, SyncAck, SyncItem, SyncRequest};
use keeper_core::{OutboxAction, Secret};

pub async fn replicate<P: Secret>(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<SyncRequest<P>>,
) -> Result<Json<SyncAck>, ServerError> {
    let total = req.items.len();
    let mut results = Vec::with_capacity(total);

    for item in req.items {
        let id = item.id;
        let outcome = match apply_item(&state, item) {
            Ok(()) => ItemOutcome {
                id,
                applied: true,
                error: None,
            },
            Err(e) => {
                tracing::warn!(kind = P::table(), id, error = %e, "Replication item rejected");
                ItemOutcome {
                    id,
                    applied: false,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(outcome);
    }

    let applied = results.iter().filter(|r| r.applied).count();
    tracing::info!(
        kind = P::table(),
        user_id = principal.user_id,
        total,
        applied,
        "Replication batch processed"
    );

    Ok(Json(SyncAck {
        message: "completed".to_string(),
        results,
    }))
}

fn apply_item<P: Secret>(state: &AppState, item: SyncItem<P>) -> Result<(), ServerError> {
    let user_id = state.auth.validate_token(&item.access_token)?;
    let conn = state.storage.conn()?;

    match item.action {
        OutboxAction::Save => {
            item.payload.validate()?;
            secrets::upsert(&conn, user_id, &item.payload)?;
        }
        OutboxAction::Delete => {
            // An unknown key is already in the desired state.
            match secrets::soft_delete_by_key::<P>(&conn, user_id, item.payload.key()) {
                Ok(_) | Err(ServerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}
