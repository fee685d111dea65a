//! SQLite storage backend for the server of record.

pub mod secrets;
pub mod users;

use crate::error::ServerError;
use keeper_core::database::models::table_ddl;
use keeper_core::{BlobPayload, CardPayload, CredentialPayload, NotePayload};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Thread-safe server storage.
#[derive(Clone)]
pub struct ServerStorage {
    conn: Arc<Mutex<Connection>>,
}

impl ServerStorage {
    pub fn open(path: &Path) -> Result<Self, anyhow::Error> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, anyhow::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> Result<(), anyhow::Error> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                login TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                token TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_token ON users(token);",
        )?;

        for ddl in [
            table_ddl::<CredentialPayload>(),
            table_ddl::<NotePayload>(),
            table_ddl::<BlobPayload>(),
            table_ddl::<CardPayload>(),
        ] {
            conn.execute_batch(&ddl)?;
        }
        Ok(())
    }

    pub fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ServerError> {
        self.conn
            .lock()
            .map_err(|e| ServerError::Internal(format!("Lock error: {}", e)))
    }
}
