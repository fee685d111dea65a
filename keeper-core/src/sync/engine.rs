//! PushData: drains the outbox to the server of record.
//!
//! One attempt reads the outbox, resolves every entry to a wire item,
//! sends one batch per secret type and removes exactly the entries whose
//! items the server reported as applied.

use crate::database::models::{
    BlobPayload, CardPayload, CredentialPayload, NotePayload, Secret,
};
use crate::database::Database;
use crate::sync::models::{SecretKind, SyncAck, SyncBatch, SyncItem};
use crate::sync::outbox::{self, OutboxEntry};
use crate::sync::remote::Remote;
use crate::{identity, store, KeeperError, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Result of a push attempt that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The outbox was empty.
    NothingToSync,
    Pushed(PushReport),
}

/// Per-group results of one push attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub groups: Vec<GroupReport>,
}

impl PushReport {
    /// Entries removed from the outbox.
    pub fn acknowledged(&self) -> usize {
        self.groups.iter().map(|g| g.acknowledged).sum()
    }

    /// Groups whose call failed as a whole.
    pub fn failed_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.error.is_some()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub kind: SecretKind,
    pub sent: usize,
    pub acknowledged: usize,
    pub error: Option<String>,
}

struct PendingGroup<P> {
    entry_ids: Vec<i64>,
    items: Vec<SyncItem<P>>,
}

impl<P> Default for PendingGroup<P> {
    fn default() -> Self {
        Self {
            entry_ids: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl<P: Secret> PendingGroup<P> {
    fn resolve(&mut self, conn: &Connection, entry: &OutboxEntry) -> Result<()> {
        let record = store::get::<P>(conn, entry.user_id, entry.secret_id)?.ok_or_else(|| {
            KeeperError::NotFound(format!(
                "outbox {}: {} {} no longer exists",
                entry.id,
                P::table(),
                entry.secret_id
            ))
        })?;
        let token = identity::token_by_user_id(conn, entry.user_id)?;

        self.entry_ids.push(entry.id);
        self.items.push(SyncItem {
            id: record.id,
            owning_user_id: entry.user_id,
            updated_at: record.updated_at_utc().to_rfc3339(),
            payload: record.payload,
            action: entry.action,
            access_token: token,
        });
        Ok(())
    }

    fn into_outgoing(self) -> Option<Outgoing> {
        if self.items.is_empty() {
            return None;
        }
        Some(Outgoing {
            batch: P::into_batch(self.items),
            entry_ids: self.entry_ids,
        })
    }
}

/// Resolved items partitioned by secret type.
#[derive(Default)]
struct Pending {
    credentials: PendingGroup<CredentialPayload>,
    notes: PendingGroup<NotePayload>,
    blobs: PendingGroup<BlobPayload>,
    cards: PendingGroup<CardPayload>,
}

impl Pending {
    fn resolve(&mut self, conn: &Connection, entry: &OutboxEntry) -> Result<()> {
        match entry.secret_type {
            SecretKind::Credentials => self.credentials.resolve(conn, entry),
            SecretKind::TextData => self.notes.resolve(conn, entry),
            SecretKind::BinaryData => self.blobs.resolve(conn, entry),
            SecretKind::Cards => self.cards.resolve(conn, entry),
        }
    }

    fn into_outgoing(self) -> Vec<Outgoing> {
        [
            self.credentials.into_outgoing(),
            self.notes.into_outgoing(),
            self.blobs.into_outgoing(),
            self.cards.into_outgoing(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

struct Outgoing {
    batch: SyncBatch,
    /// Outbox ids, index-aligned with the batch items.
    entry_ids: Vec<i64>,
}

/// Outbox ids whose items the server applied.
fn acknowledged_entries(outgoing: &Outgoing, ack: &SyncAck) -> Result<Vec<i64>> {
    let item_ids = outgoing.batch.item_ids();
    if ack.results.len() != item_ids.len() {
        return Err(KeeperError::Transport(format!(
            "acknowledgement covers {} of {} items",
            ack.results.len(),
            item_ids.len()
        )));
    }

    let mut applied = Vec::new();
    for ((result, item_id), entry_id) in ack.results.iter().zip(&item_ids).zip(&outgoing.entry_ids) {
        if result.id != *item_id {
            return Err(KeeperError::Transport(format!(
                "acknowledgement out of order: expected item {}, got {}",
                item_id, result.id
            )));
        }
        if result.applied {
            applied.push(*entry_id);
        } else {
            warn!(
                kind = %outgoing.batch.kind(),
                item = item_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Server rejected item, keeping it queued"
            );
        }
    }
    Ok(applied)
}

/// Runs PushData attempts against a shared local database.
pub struct Pusher {
    db: Arc<Mutex<Database>>,
    remote: Arc<dyn Remote>,
}

impl Pusher {
    pub fn new(db: Arc<Mutex<Database>>, remote: Arc<dyn Remote>) -> Self {
        Self { db, remote }
    }

    /// Read, resolve, send and clear. Entries of a group that failed, and
    /// items the server did not apply, stay in the outbox for the next try.
    pub async fn push_data(&self) -> Result<PushOutcome> {
        let outgoing = {
            let db = self
                .db
                .lock()
                .map_err(|_| KeeperError::lock_poisoned("push read"))?;
            let conn = db.conn();

            let entries = outbox::read_all(conn)?;
            if entries.is_empty() {
                return Ok(PushOutcome::NothingToSync);
            }

            let mut pending = Pending::default();
            for entry in &entries {
                pending.resolve(conn, entry)?;
            }
            pending.into_outgoing()
        };

        let mut report = PushReport::default();
        let mut to_remove: Vec<(SecretKind, Vec<i64>)> = Vec::new();

        for group in &outgoing {
            let kind = group.batch.kind();
            let sent = group.batch.len();

            let acked = match self.remote.replicate(&group.batch).await {
                Ok(ack) => acknowledged_entries(group, &ack),
                Err(e) => Err(e),
            };

            match acked {
                Ok(ids) => {
                    debug!(%kind, sent, applied = ids.len(), "Batch acknowledged");
                    report.groups.push(GroupReport {
                        kind,
                        sent,
                        acknowledged: ids.len(),
                        error: None,
                    });
                    to_remove.push((kind, ids));
                }
                Err(e) => {
                    warn!(%kind, sent, error = %e, "Batch failed, will retry");
                    report.groups.push(GroupReport {
                        kind,
                        sent,
                        acknowledged: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let mut clear_errors = Vec::new();
        {
            let db = self
                .db
                .lock()
                .map_err(|_| KeeperError::lock_poisoned("push clear"))?;
            for (kind, ids) in &to_remove {
                if let Err(e) = outbox::remove_entries(db.conn(), ids) {
                    clear_errors.push(format!("{}: {}", kind, e));
                }
            }
        }

        if !clear_errors.is_empty() {
            return Err(KeeperError::Internal(format!(
                "failed to clear outbox: {}",
                clear_errors.join("; ")
            )));
        }

        info!(
            acknowledged = report.acknowledged(),
            failed_groups = report.failed_groups(),
            "Push completed"
        );
        Ok(PushOutcome::Pushed(report))
    }
}
