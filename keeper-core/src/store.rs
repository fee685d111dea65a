//! Local credential stores, one table per secret type.
//!
//! Every operation is scoped by the owning user id supplied by the caller.
//! Deletes are logical: the row stays with `deleted_status = 1`.

use crate::database::models::{Secret, SecretRecord};
use crate::{KeeperError, Result};
use chrono::Utc;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

/// Insert a secret, or update the live or deleted row that already holds
/// its natural key. Returns the row id. A save of a deleted key brings the
/// row back.
pub fn upsert<P: Secret>(conn: &Connection, user_id: i64, payload: &P) -> Result<i64> {
    let placeholders = (0..P::COLUMNS.len() + 2)
        .map(|i| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = P::COLUMNS[1..]
        .iter()
        .map(|(name, _)| format!("{name} = excluded.{name}, "))
        .collect::<String>();

    let sql = format!(
        "INSERT INTO {table} (user_id, updated_at, {columns}) VALUES ({placeholders})
         ON CONFLICT(user_id, {key}) DO UPDATE SET
            {updates}updated_at = excluded.updated_at,
            deleted_status = 0
         RETURNING id",
        table = P::table(),
        columns = P::column_list(),
        key = P::key_column(),
    );

    let mut values = vec![
        rusqlite::types::Value::Integer(user_id),
        rusqlite::types::Value::Integer(Utc::now().timestamp()),
    ];
    values.extend(payload.to_values());

    let id = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(id)
}

/// Mark a secret deleted. Returns `false` when it was already deleted;
/// fails with `NotFound` when the user owns no such row.
pub fn soft_delete<P: Secret>(conn: &Connection, user_id: i64, id: i64) -> Result<bool> {
    let sql = format!(
        "UPDATE {} SET deleted_status = 1, updated_at = ?1
         WHERE id = ?2 AND user_id = ?3 AND deleted_status = 0",
        P::table()
    );
    let changed = conn.execute(&sql, rusqlite::params![Utc::now().timestamp(), id, user_id])?;
    if changed > 0 {
        return Ok(true);
    }

    if get::<P>(conn, user_id, id)?.is_some() {
        Ok(false)
    } else {
        Err(KeeperError::NotFound(format!("{} {}", P::table(), id)))
    }
}

/// Fetch one row by id, deleted or not.
pub fn get<P: Secret>(conn: &Connection, user_id: i64, id: i64) -> Result<Option<SecretRecord<P>>> {
    let sql = format!(
        "SELECT id, user_id, updated_at, deleted_status, {} FROM {}
         WHERE id = ?1 AND user_id = ?2",
        P::column_list(),
        P::table()
    );
    let record = conn
        .query_row(&sql, rusqlite::params![id, user_id], read_record::<P>)
        .optional()?;
    Ok(record)
}

/// All live (not deleted) rows of a user, oldest first.
pub fn list_all<P: Secret>(conn: &Connection, user_id: i64) -> Result<Vec<SecretRecord<P>>> {
    let sql = format!(
        "SELECT id, user_id, updated_at, deleted_status, {} FROM {}
         WHERE user_id = ?1 AND deleted_status = 0
         ORDER BY id",
        P::column_list(),
        P::table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([user_id], read_record::<P>)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub(crate) fn read_record<P: Secret>(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecretRecord<P>> {
    Ok(SecretRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        updated_at: row.get(2)?,
        deleted: row.get(3)?,
        payload: P::from_row(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{BlobPayload, CardPayload, CredentialPayload, NotePayload};
    use crate::database::Database;
    use crate::identity::remember_login;

    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        db.initialize_schema().unwrap();
        let alice = remember_login(db.conn(), "alice", "h", "ta").unwrap();
        let bob = remember_login(db.conn(), "bob", "h", "tb").unwrap();
        (db, alice, bob)
    }

    fn credential(resource: &str) -> CredentialPayload {
        CredentialPayload {
            resource: resource.to_string(),
            login: "alice".to_string(),
            password: "s3cr3t".to_string(),
        }
    }

    #[test]
    fn save_then_list_round_trip() {
        let (db, alice, _) = setup();
        let conn = db.conn();

        let id = upsert(conn, alice, &credential("github")).unwrap();
        let rows = list_all::<CredentialPayload>(conn, alice).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert!(!rows[0].deleted);
        assert_eq!(rows[0].payload, credential("github"));
    }

    #[test]
    fn soft_delete_is_idempotent_and_keeps_row() {
        let (db, alice, _) = setup();
        let conn = db.conn();
        let id = upsert(conn, alice, &NotePayload { text: "n".into() }).unwrap();

        assert!(soft_delete::<NotePayload>(conn, alice, id).unwrap());
        assert!(!soft_delete::<NotePayload>(conn, alice, id).unwrap());

        assert!(list_all::<NotePayload>(conn, alice).unwrap().is_empty());
        let stored = get::<NotePayload>(conn, alice, id).unwrap().unwrap();
        assert!(stored.deleted);
    }

    #[test]
    fn rows_are_scoped_to_their_owner() {
        let (db, alice, bob) = setup();
        let conn = db.conn();

        let card = CardPayload {
            number: "4111111111111111".into(),
            holder: "ALICE".into(),
            expiry: "01/30".into(),
            cvv: "000".into(),
        };
        let id = upsert(conn, alice, &card).unwrap();

        assert!(list_all::<CardPayload>(conn, bob).unwrap().is_empty());
        assert!(get::<CardPayload>(conn, bob, id).unwrap().is_none());
        assert!(matches!(
            soft_delete::<CardPayload>(conn, bob, id),
            Err(KeeperError::NotFound(_))
        ));
        assert_eq!(list_all::<CardPayload>(conn, alice).unwrap().len(), 1);
    }

    #[test]
    fn blobs_keep_binary_data() {
        let (db, alice, _) = setup();
        let conn = db.conn();
        let blob = BlobPayload {
            name: "key.bin".into(),
            data: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let id = upsert(conn, alice, &blob).unwrap();
        let stored = get::<BlobPayload>(conn, alice, id).unwrap().unwrap();
        assert_eq!(stored.payload.data, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn saving_a_known_key_updates_the_same_row() {
        let (db, alice, _) = setup();
        let conn = db.conn();

        let first = upsert(conn, alice, &credential("github")).unwrap();
        let changed = CredentialPayload {
            password: "rotated".into(),
            ..credential("github")
        };
        let second = upsert(conn, alice, &changed).unwrap();
        assert_eq!(first, second);

        let rows = list_all::<CredentialPayload>(conn, alice).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload.password, "rotated");

        assert!(soft_delete::<CredentialPayload>(conn, alice, first).unwrap());
        let revived = upsert(conn, alice, &credential("github")).unwrap();
        assert_eq!(revived, first);
        assert!(!get::<CredentialPayload>(conn, alice, first).unwrap().unwrap().deleted);
    }
}
