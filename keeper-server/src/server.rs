//! Axum router setup.

use crate::accounts::AuthService;
use crate::auth::token_gate;
use crate::config::ServerConfig;
use crate::handlers::{self, auth, secrets, sync};
use crate::storage::ServerStorage;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use keeper_core::{BlobPayload, CardPayload, CredentialPayload, NotePayload, Secret};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: ServerStorage,
    pub auth: AuthService,
}

impl AppState {
    pub fn new(storage: ServerStorage, config: &ServerConfig) -> Self {
        let auth = AuthService::new(storage.clone(), &config.token_secret, config.token_ttl_hours);
        Self { storage, auth }
    }
}

/// Replication, direct write, delete and list routes for one kind.
fn secret_routes<P: Secret>() -> Router<AppState> {
    let kind = P::table();
    Router::new()
        .route(&format!("/api/v1/sync/{kind}"), post(sync::replicate::<P>))
        .route(
            &format!("/api/v1/{kind}"),
            post(secrets::save::<P>).get(secrets::list::<P>),
        )
        .route(&format!("/api/v1/{kind}/delete"), post(secrets::delete::<P>))
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Authenticated routes
    let authenticated = Router::new()
        .merge(secret_routes::<CredentialPayload>())
        .merge(secret_routes::<NotePayload>())
        .merge(secret_routes::<BlobPayload>())
        .merge(secret_routes::<CardPayload>())
        .layer(middleware::from_fn_with_state(state.clone(), token_gate));

    // Unauthenticated routes
    let public = Router::new()
        .route("/api/v1/register", post(auth::register))
        .route("/api/v1/auth", post(auth::auth))
        .route("/health", get(handlers::health));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}
