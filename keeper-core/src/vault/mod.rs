//! Vault: the client-side write path.
//!
//! Every call names the caller by access token. The token is resolved to a
//! local user id, the store is mutated, and the matching outbox entry is
//! appended in the same transaction.


use crate::database::models::{
    BlobPayload, CardPayload, CredentialPayload, NotePayload, Secret, SecretRecord,
};
use crate::database::Database;
use crate::sync::models::OutboxAction;
use crate::sync::outbox;
use crate::{identity, store, KeeperError, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Handle to the local database shared with the sync worker.
#[derive(Clone)]
pub struct Vault {
    db: Arc<Mutex<Database>>,
}

impl Vault {
    /// Open (or create) the local database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::open(path)?;
        db.initialize_schema()?;
        db.validate_schema_version()?;
        Ok(Self::from_database(db))
    }

    /// Fresh in-memory vault.
    pub fn in_memory() -> Result<Self> {
        let db = Database::in_memory()?;
        db.initialize_schema()?;
        Ok(Self::from_database(db))
    }

    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Shared database handle, for the authenticator and the sync worker.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| KeeperError::lock_poisoned("vault"))
    }

    /// Save a secret for the token's user and queue it for sync. A secret
    /// with the same natural key is updated in place, or revived if deleted.
    pub fn save<P: Secret>(&self, token: &str, payload: &P) -> Result<i64> {
        payload.validate()?;

        let db = self.lock()?;
        let conn = db.conn();
        let user_id = identity::user_id_by_token(conn, token)?;

        let tx = conn.unchecked_transaction()?;
        let id = store::upsert(&tx, user_id, payload)?;
        outbox::append(&tx, user_id, P::KIND, id, OutboxAction::Save)?;
        tx.commit()?;

        info!(kind = %P::KIND, id, user_id, "Secret saved");
        Ok(id)
    }

    /// Soft-delete a secret and queue the deletion. Deleting an already
    /// deleted secret succeeds without queueing anything.
    pub fn delete<P: Secret>(&self, token: &str, id: i64) -> Result<()> {
        let db = self.lock()?;
        let conn = db.conn();
        let user_id = identity::user_id_by_token(conn, token)?;

        let tx = conn.unchecked_transaction()?;
        if !store::soft_delete::<P>(&tx, user_id, id)? {
            debug!(kind = %P::KIND, id, "Secret already deleted");
            return Ok(());
        }
        outbox::append(&tx, user_id, P::KIND, id, OutboxAction::Delete)?;
        tx.commit()?;

        info!(kind = %P::KIND, id, user_id, "Secret deleted");
        Ok(())
    }

    /// Live secrets of the token's user.
    pub fn list<P: Secret>(&self, token: &str) -> Result<Vec<SecretRecord<P>>> {
        let db = self.lock()?;
        let conn = db.conn();
        let user_id = identity::user_id_by_token(conn, token)?;
        store::list_all::<P>(conn, user_id)
    }

    /// One secret of the token's user, deleted or not.
    pub fn get<P: Secret>(&self, token: &str, id: i64) -> Result<SecretRecord<P>> {
        let db = self.lock()?;
        let conn = db.conn();
        let user_id = identity::user_id_by_token(conn, token)?;
        store::get::<P>(conn, user_id, id)?
            .ok_or_else(|| KeeperError::NotFound(format!("{} {}", P::table(), id)))
    }

    pub fn save_credential(
        &self,
        token: &str,
        resource: &str,
        login: &str,
        password: &str,
    ) -> Result<i64> {
        self.save(
            token,
            &CredentialPayload {
                resource: resource.to_string(),
                login: login.to_string(),
                password: password.to_string(),
            },
        )
    }

    pub fn save_note(&self, token: &str, text: &str) -> Result<i64> {
        self.save(
            token,
            &NotePayload {
                text: text.to_string(),
            },
        )
    }

    pub fn save_blob(&self, token: &str, name: &str, data: Vec<u8>) -> Result<i64> {
        self.save(
            token,
            &BlobPayload {
                name: name.to_string(),
                data,
            },
        )
    }

    pub fn save_card(&self, token: &str, card: &CardPayload) -> Result<i64> {
        self.save(token, card)
    }

    /// Cached token of a login that has signed in on this device before.
    pub fn cached_token(&self, login: &str) -> Result<String> {
        let db = self.lock()?;
        let user = identity::find_by_login(db.conn(), login)?
            .ok_or_else(|| KeeperError::NotFound(format!("login {}", login)))?;
        identity::token_by_user_id(db.conn(), user.id)
    }

    /// Number of mutations still waiting for the server.
    pub fn pending_changes(&self) -> Result<u64> {
        let db = self.lock()?;
        outbox::count_pending(db.conn())
    }
}
