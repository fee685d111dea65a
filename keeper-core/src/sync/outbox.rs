//! Outbox: local mutations not yet confirmed by the server.
//!
//! One row per (secret type, secret id, action). Rows are appended right
//! after the local mutation and removed only once the server acknowledged
//! the corresponding item.

use crate::sync::models::{OutboxAction, SecretKind};
use crate::{KeeperError, Result};
use chrono::Utc;
use rusqlite::Connection;

/// A pending outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: i64,
    pub user_id: i64,
    pub secret_type: SecretKind,
    pub secret_id: i64,
    pub action: OutboxAction,
    pub updated_at: i64,
}

/// Append a pending mutation and return the entry id.
pub fn append(
    conn: &Connection,
    user_id: i64,
    secret_type: SecretKind,
    secret_id: i64,
    action: OutboxAction,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO outbox (user_id, secret_type, secret_id, action, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            user_id,
            secret_type.as_str(),
            secret_id,
            action.as_str(),
            Utc::now().timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every pending entry in append order.
pub fn read_all(conn: &Connection) -> Result<Vec<OutboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, secret_type, secret_id, action, updated_at
         FROM outbox ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, user_id, secret_type, secret_id, action, updated_at)| {
            let secret_type = SecretKind::parse(&secret_type).ok_or_else(|| {
                KeeperError::Internal(format!("outbox {}: unknown secret type {}", id, secret_type))
            })?;
            let action = OutboxAction::parse(&action).ok_or_else(|| {
                KeeperError::Internal(format!("outbox {}: unknown action {}", id, action))
            })?;
            Ok(OutboxEntry {
                id,
                user_id,
                secret_type,
                secret_id,
                action,
                updated_at,
            })
        })
        .collect()
}

/// Remove exactly the given entries. Returns how many were deleted.
pub fn remove_entries(conn: &Connection, ids: &[i64]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    let mut removed = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM outbox WHERE id = ?1")?;
        for id in ids {
            removed += stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(removed)
}

/// Drop every pending entry of one type, whatever was actually sent.
///
/// The sync worker uses [`remove_entries`]; this is for explicit resets.
pub fn clear_by_type(conn: &Connection, secret_type: SecretKind) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM outbox WHERE secret_type = ?1",
        [secret_type.as_str()],
    )?;
    Ok(removed)
}

/// Number of pending entries.
pub fn count_pending(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::identity::remember_login;

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();
        let user = remember_login(db.conn(), "alice", "h", "t").unwrap();
        (db, user)
    }

    #[test]
    fn append_and_read_in_order() {
        let (db, user) = setup();
        let conn = db.conn();

        append(conn, user, SecretKind::Credentials, 1, OutboxAction::Save).unwrap();
        append(conn, user, SecretKind::Cards, 2, OutboxAction::Save).unwrap();
        append(conn, user, SecretKind::Credentials, 1, OutboxAction::Delete).unwrap();

        let entries = read_all(conn).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].secret_type, SecretKind::Credentials);
        assert_eq!(entries[1].secret_type, SecretKind::Cards);
        assert_eq!(entries[2].action, OutboxAction::Delete);
        assert_eq!(count_pending(conn).unwrap(), 3);
    }

    #[test]
    fn remove_entries_spares_the_rest() {
        let (db, user) = setup();
        let conn = db.conn();

        let a = append(conn, user, SecretKind::TextData, 1, OutboxAction::Save).unwrap();
        let b = append(conn, user, SecretKind::TextData, 2, OutboxAction::Save).unwrap();

        assert_eq!(remove_entries(conn, &[a]).unwrap(), 1);
        let left = read_all(conn).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, b);

        assert_eq!(remove_entries(conn, &[]).unwrap(), 0);
        assert_eq!(remove_entries(conn, &[a]).unwrap(), 0);
    }

    #[test]
    fn clear_by_type_drops_only_that_type() {
        let (db, user) = setup();
        let conn = db.conn();

        append(conn, user, SecretKind::BinaryData, 1, OutboxAction::Save).unwrap();
        append(conn, user, SecretKind::BinaryData, 2, OutboxAction::Save).unwrap();
        append(conn, user, SecretKind::Cards, 3, OutboxAction::Save).unwrap();

        assert_eq!(clear_by_type(conn, SecretKind::BinaryData).unwrap(), 2);
        let left = read_all(conn).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].secret_type, SecretKind::Cards);
    }

    #[test]
    fn unknown_type_is_reported() {
        let (db, user) = setup();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO outbox (user_id, secret_type, secret_id, action, updated_at)
             VALUES (?1, 'ssh_keys', 1, 'save', 0)",
            [user],
        )
        .unwrap();

        assert!(matches!(read_all(conn), Err(KeeperError::Internal(_))));
    }
}
