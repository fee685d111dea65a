//! Database schema and connection management.

use crate::database::models::{
    table_ddl, BlobPayload, CardPayload, CredentialPayload, NotePayload,
};
use crate::{KeeperError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Current schema version, stored in `PRAGMA user_version`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Local database: identity cache, per-type secret tables and the outbox.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database for testing
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(Self { conn })
    }

    /// Create every table if missing and stamp the schema version.
    pub fn initialize_schema(&self) -> Result<()> {
        self.create_users_table()?;
        self.create_secret_tables()?;
        self.create_outbox_table()?;
        self.conn
            .pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
        Ok(())
    }

    fn create_users_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                token TEXT,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_secret_tables(&self) -> Result<()> {
        for ddl in [
            table_ddl::<CredentialPayload>(),
            table_ddl::<NotePayload>(),
            table_ddl::<BlobPayload>(),
            table_ddl::<CardPayload>(),
        ] {
            self.conn.execute_batch(&ddl)?;
        }
        Ok(())
    }

    fn create_outbox_table(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                secret_type TEXT NOT NULL,
                secret_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            CREATE INDEX IF NOT EXISTS idx_outbox_secret_type ON outbox(secret_type);",
        )?;
        Ok(())
    }

    /// Refuse to run against a database written by a newer schema.
    pub fn validate_schema_version(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version > CURRENT_SCHEMA_VERSION {
            return Err(KeeperError::Internal(format!(
                "Schema version mismatch: expected {}, found {}",
                CURRENT_SCHEMA_VERSION, version
            )));
        }
        Ok(())
    }

    /// Get a reference to the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
