//! Identity store: cached users, password hashes and access tokens.
//!
//! One row per login. A successful online login replaces the cached token,
//! so each user has at most one active token on this device.

use crate::{KeeperError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

/// A cached user row.
#[derive(Debug, Clone)]
pub struct CachedUser {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub token: Option<String>,
    pub updated_at: i64,
}

/// Insert a new login or rotate the token (and hash) of an existing one.
/// Returns the local user id.
pub fn remember_login(
    conn: &Connection,
    login: &str,
    password_hash: &str,
    token: &str,
) -> Result<i64> {
    let now = Utc::now().timestamp();
    let id = conn.query_row(
        "INSERT INTO users (login, password_hash, token, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(login) DO UPDATE SET
            password_hash = excluded.password_hash,
            token = excluded.token,
            updated_at = excluded.updated_at
         RETURNING id",
        params![login, password_hash, token, now],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Look up a cached user by login.
pub fn find_by_login(conn: &Connection, login: &str) -> Result<Option<CachedUser>> {
    let user = conn
        .query_row(
            "SELECT id, login, password_hash, token, updated_at FROM users WHERE login = ?1",
            [login],
            |row| {
                Ok(CachedUser {
                    id: row.get(0)?,
                    login: row.get(1)?,
                    password_hash: row.get(2)?,
                    token: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Resolve a token to its local user id.
pub fn user_id_by_token(conn: &Connection, token: &str) -> Result<i64> {
    if token.is_empty() {
        return Err(KeeperError::Unauthenticated("token is empty".to_string()));
    }

    conn.query_row("SELECT id FROM users WHERE token = ?1", [token], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or_else(|| KeeperError::Unauthenticated("invalid token".to_string()))
}

/// Current token of a local user.
pub fn token_by_user_id(conn: &Connection, user_id: i64) -> Result<String> {
    let token: Option<Option<String>> = conn
        .query_row("SELECT token FROM users WHERE id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?;

    match token {
        None => Err(KeeperError::NotFound(format!("user {}", user_id))),
        Some(None) => Err(KeeperError::Unauthenticated(format!(
            "no cached token for user {}",
            user_id
        ))),
        Some(Some(token)) if token.is_empty() => Err(KeeperError::Unauthenticated(format!(
            "no cached token for user {}",
            user_id
        ))),
        Some(Some(token)) => Ok(token),
    }
}
