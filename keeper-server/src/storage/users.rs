//! Registered users and their single active token.

use crate::error::ServerError;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

/// Stored login with its password hash.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
}

/// Insert a new user. Fails with `AlreadyExists` when the login is taken.
pub fn create_user(conn: &Connection, login: &str, password_hash: &str) -> Result<i64, ServerError> {
    let inserted = conn.execute(
        "INSERT INTO users (login, password_hash, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(login) DO NOTHING",
        rusqlite::params![login, password_hash, Utc::now().timestamp()],
    )?;
    if inserted == 0 {
        return Err(ServerError::AlreadyExists(format!(
            "login {} already exists",
            login
        )));
    }
    Ok(conn.last_insert_rowid())
}

pub fn find_by_login(conn: &Connection, login: &str) -> Result<Option<UserRecord>, ServerError> {
    let user = conn
        .query_row(
            "SELECT id, login, password_hash FROM users WHERE login = ?1",
            [login],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    login: row.get(1)?,
                    password_hash: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Replace the user's active token.
pub fn set_token(conn: &Connection, user_id: i64, token: &str) -> Result<(), ServerError> {
    let updated = conn.execute(
        "UPDATE users SET token = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![token, Utc::now().timestamp(), user_id],
    )?;
    if updated == 0 {
        return Err(ServerError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

/// Reverse lookup of the active token.
pub fn user_id_by_token(conn: &Connection, token: &str) -> Result<Option<i64>, ServerError> {
    let id = conn
        .query_row("SELECT id FROM users WHERE token = ?1", [token], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}
