//! Server-side credential stores.
//!
//! Saves upsert on `(user_id, natural key)`, so a retried save updates the
//! row it already created instead of duplicating it, and a save after a
//! delete brings the row back.

use crate::error::ServerError;
use chrono::Utc;
use keeper_core::{store, Secret, SecretRecord};
use rusqlite::{Connection, OptionalExtension};

/// Insert or update a secret for `user_id`. Returns the row id.
pub fn upsert<P: Secret>(conn: &Connection, user_id: i64, payload: &P) -> Result<i64, ServerError> {
    Ok(store::upsert(conn, user_id, payload)?)
}

/// Soft-delete by natural key. Returns `false` when the row was already
/// deleted; fails with `NotFound` when the user never stored the key.
pub fn soft_delete_by_key<P: Secret>(
    conn: &Connection,
    user_id: i64,
    key: &str,
) -> Result<bool, ServerError> {
    let sql = format!(
        "UPDATE {} SET deleted_status = 1, updated_at = ?1
         WHERE user_id = ?2 AND {} = ?3 AND deleted_status = 0",
        P::table(),
        P::key_column()
    );
    let changed = conn.execute(&sql, rusqlite::params![Utc::now().timestamp(), user_id, key])?;
    if changed > 0 {
        return Ok(true);
    }

    let exists = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {} WHERE user_id = ?1 AND {} = ?2",
                P::table(),
                P::key_column()
            ),
            rusqlite::params![user_id, key],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(false)
    } else {
        Err(ServerError::NotFound(format!("{} not found", P::KIND)))
    }
}

/// Live secrets of a user.
pub fn list_live<P: Secret>(conn: &Connection, user_id: i64) -> Result<Vec<SecretRecord<P>>, ServerError> {
    Ok(store::list_all::<P>(conn, user_id)?)
}
