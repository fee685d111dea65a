pub mod auth;
pub mod secrets;
pub mod sync;

use axum::Json;
use keeper_core::sync::models::HealthResponse;

/// Liveness probe used by clients to choose online or offline login.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "SERVING".to_string(),
    })
}
