//! HTTP client for the keeper server.

use crate::sync::models::{
    AuthResponse, HealthResponse, LoginRequest, RegisterResponse, SyncAck, SyncBatch,
};
use crate::sync::remote::Remote;
use crate::{KeeperError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// [`Remote`] over HTTP + JSON.
pub struct HttpRemote {
    client: reqwest::Client,
    server_url: String,
}

impl HttpRemote {
    /// Create a client for `server_url` with a per-request timeout.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeeperError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<R> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| KeeperError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        resp.json()
            .await
            .map_err(|e| KeeperError::Transport(format!("Invalid response from {}: {}", path, e)))
    }
}

/// Map an error response back onto the shared error taxonomy.
async fn error_from_response(resp: reqwest::Response) -> KeeperError {
    let status = resp.status();
    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::BAD_REQUEST => KeeperError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED => KeeperError::Unauthenticated(message),
        StatusCode::NOT_FOUND => KeeperError::NotFound(message),
        StatusCode::CONFLICT => KeeperError::AlreadyExists(message),
        _ => KeeperError::Transport(format!("Server error {}: {}", status, message)),
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn register(&self, login: &str, password: &str) -> Result<i64> {
        let body = LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        };
        let resp: RegisterResponse = self.post_json("/api/v1/register", None, &body).await?;
        Ok(resp.user_id)
    }

    async fn authenticate(&self, login: &str, password: &str) -> Result<String> {
        let body = LoginRequest {
            login: login.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self.post_json("/api/v1/auth", None, &body).await?;
        Ok(resp.token)
    }

    async fn health(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| KeeperError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let health: HealthResponse = resp
            .json()
            .await
            .map_err(|e| KeeperError::Transport(e.to_string()))?;
        if health.status != "SERVING" {
            return Err(KeeperError::Transport(format!(
                "Server not serving: {}",
                health.status
            )));
        }
        Ok(())
    }

    async fn replicate(&self, batch: &SyncBatch) -> Result<SyncAck> {
        let path = format!("/api/v1/sync/{}", batch.kind());
        let body = batch
            .to_body()
            .map_err(|e| KeeperError::Internal(format!("Failed to encode batch: {}", e)))?;
        self.post_json(&path, batch.bearer(), &body).await
    }
}
