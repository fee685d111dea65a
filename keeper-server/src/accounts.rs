//! Server auth service: registration, login and token validation.

use crate::error::ServerError;
use crate::storage::{users, ServerStorage};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use keeper_core::crypto;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    login: String,
    /// Issued-at unix seconds
    iat: i64,
    /// Expiration unix seconds
    exp: i64,
    /// Unique per issuance, so a re-login always rotates the token.
    jti: String,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

#[derive(Clone)]
pub struct AuthService {
    storage: ServerStorage,
    keys: Arc<TokenKeys>,
    ttl: Duration,
}

fn require_credentials(login: &str, password: &str) -> Result<(), ServerError> {
    if login.is_empty() || password.is_empty() {
        return Err(ServerError::InvalidArgument(
            "login and password are required".to_string(),
        ));
    }
    Ok(())
}

impl AuthService {
    pub fn new(storage: ServerStorage, secret: &str, ttl_hours: i64) -> Self {
        Self {
            storage,
            keys: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            }),
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Create a user and return its id.
    pub fn register(&self, login: &str, password: &str) -> Result<i64, ServerError> {
        require_credentials(login, password)?;

        {
            let conn = self.storage.conn()?;
            if users::find_by_login(&conn, login)?.is_some() {
                return Err(ServerError::AlreadyExists(format!(
                    "login {} already exists",
                    login
                )));
            }
        }

        let hash = crypto::hash_password(password)?;
        let conn = self.storage.conn()?;
        let id = users::create_user(&conn, login, &hash)?;
        tracing::info!(login, user_id = id, "User registered");
        Ok(id)
    }

    /// Verify the password and issue a new token, replacing the old one.
    pub fn login(&self, login: &str, password: &str) -> Result<String, ServerError> {
        require_credentials(login, password)?;

        let user = {
            let conn = self.storage.conn()?;
            users::find_by_login(&conn, login)?
                .ok_or_else(|| ServerError::NotFound(format!("login {} not found", login)))?
        };

        if !crypto::verify_password(password, &user.password_hash)? {
            return Err(ServerError::Unauthenticated("wrong password".to_string()));
        }

        let token = self.issue_token(&user.login)?;
        if token.is_empty() {
            return Err(ServerError::Internal("access token is empty".to_string()));
        }

        let conn = self.storage.conn()?;
        users::set_token(&conn, user.id, &token)?;
        tracing::info!(login, user_id = user.id, "Token issued");
        Ok(token)
    }

    /// Resolve a token to the user it was last issued to.
    pub fn validate_token(&self, token: &str) -> Result<i64, ServerError> {
        if token.is_empty() {
            return Err(ServerError::Unauthenticated("invalid token".to_string()));
        }

        let user_id = {
            let conn = self.storage.conn()?;
            users::user_id_by_token(&conn, token)?
        }
        .ok_or_else(|| ServerError::Unauthenticated("invalid token".to_string()))?;

        jsonwebtoken::decode::<Claims>(token, &self.keys.decoding, &Validation::default())
            .map_err(|e| ServerError::Unauthenticated(format!("invalid token: {}", e)))?;

        Ok(user_id)
    }

    fn issue_token(&self, login: &str) -> Result<String, ServerError> {
        let now = Utc::now();
        let claims = Claims {
            login: login.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.keys.encoding)
            .map_err(|e| ServerError::Internal(format!("token signing failed: {}", e)))
    }
}
