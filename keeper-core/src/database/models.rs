//! Database models for stored secrets.
//!
//! Each secret type implements [`Secret`], which describes its table, its
//! payload columns and its natural key. The client stores and the server
//! storage are both written against this trait.

use crate::sync::models::{SecretKind, SyncBatch, SyncItem};
use crate::{KeeperError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A secret payload type with its own table.
pub trait Secret: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: SecretKind;

    /// Payload columns as `(name, sql type)`, in bind order. The first
    /// column is the natural key.
    const COLUMNS: &'static [(&'static str, &'static str)];

    /// Natural key identifying the secret across devices.
    fn key(&self) -> &str;

    /// Column values in [`Secret::COLUMNS`] order.
    fn to_values(&self) -> Vec<Value>;

    /// Read the payload starting at column `offset`.
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self>;

    /// Reject payloads missing required fields.
    fn validate(&self) -> Result<()>;

    /// Wrap wire items of this type into a tagged batch.
    fn into_batch(items: Vec<SyncItem<Self>>) -> SyncBatch;

    fn table() -> &'static str {
        Self::KIND.as_str()
    }

    fn key_column() -> &'static str {
        Self::COLUMNS[0].0
    }

    /// Comma-separated payload column names.
    fn column_list() -> String {
        Self::COLUMNS
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A stored secret row.
#[derive(Debug, Clone)]
pub struct SecretRecord<P> {
    pub id: i64,
    pub user_id: i64,
    pub payload: P,
    /// Unix timestamp of the last mutation.
    pub updated_at: i64,
    pub deleted: bool,
}

impl<P> SecretRecord<P> {
    pub fn updated_at_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.updated_at, 0)
            .single()
            .unwrap_or_default()
    }
}

/// DDL for a secret table. Client and server share it, so both sides
/// upsert saves on `(user_id, key)`.
pub fn table_ddl<P: Secret>() -> String {
    let table = P::table();
    let columns = P::COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {} NOT NULL", name, ty))
        .collect::<Vec<_>>()
        .join(",\n                ");
    let key = P::key_column();

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                {columns},
                updated_at INTEGER NOT NULL,
                deleted_status INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE (user_id, {key})
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_user ON {table}(user_id);"
    )
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KeeperError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(())
}

/// Login/password pair for a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub resource: String,
    pub login: String,
    pub password: String,
}

impl Secret for CredentialPayload {
    const KIND: SecretKind = SecretKind::Credentials;
    const COLUMNS: &'static [(&'static str, &'static str)] =
        &[("resource", "TEXT"), ("login", "TEXT"), ("password", "TEXT")];

    fn key(&self) -> &str {
        &self.resource
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.resource.clone()),
            Value::Text(self.login.clone()),
            Value::Text(self.password.clone()),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            resource: row.get(offset)?,
            login: row.get(offset + 1)?,
            password: row.get(offset + 2)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("resource", &self.resource)?;
        require("login", &self.login)?;
        require("password", &self.password)
    }

    fn into_batch(items: Vec<SyncItem<Self>>) -> SyncBatch {
        SyncBatch::Credentials(items)
    }
}

/// Free-form text note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub text: String,
}

impl Secret for NotePayload {
    const KIND: SecretKind = SecretKind::TextData;
    const COLUMNS: &'static [(&'static str, &'static str)] = &[("text", "TEXT")];

    fn key(&self) -> &str {
        &self.text
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.text.clone())]
    }

    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            text: row.get(offset)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("text", &self.text)
    }

    fn into_batch(items: Vec<SyncItem<Self>>) -> SyncBatch {
        SyncBatch::TextData(items)
    }
}

/// Named binary blob. `data` travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobPayload {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Secret for BlobPayload {
    const KIND: SecretKind = SecretKind::BinaryData;
    const COLUMNS: &'static [(&'static str, &'static str)] = &[("name", "TEXT"), ("data", "BLOB")];

    fn key(&self) -> &str {
        &self.name
    }

    fn to_values(&self) -> Vec<Value> {
        vec![Value::Text(self.name.clone()), Value::Blob(self.data.clone())]
    }

    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(offset)?,
            data: row.get(offset + 1)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("name", &self.name)
    }

    fn into_batch(items: Vec<SyncItem<Self>>) -> SyncBatch {
        SyncBatch::BinaryData(items)
    }
}

/// Payment card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub number: String,
    pub holder: String,
    /// `MM/YY`
    pub expiry: String,
    pub cvv: String,
}

impl Secret for CardPayload {
    const KIND: SecretKind = SecretKind::Cards;
    const COLUMNS: &'static [(&'static str, &'static str)] = &[
        ("number", "TEXT"),
        ("holder", "TEXT"),
        ("expiry", "TEXT"),
        ("cvv", "TEXT"),
    ];

    fn key(&self) -> &str {
        &self.number
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.number.clone()),
            Value::Text(self.holder.clone()),
            Value::Text(self.expiry.clone()),
            Value::Text(self.cvv.clone()),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            number: row.get(offset)?,
            holder: row.get(offset + 1)?,
            expiry: row.get(offset + 2)?,
            cvv: row.get(offset + 3)?,
        })
    }

    fn validate(&self) -> Result<()> {
        require("number", &self.number)?;
        require("holder", &self.holder)?;
        if !self
            .number
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ')
        {
            return Err(KeeperError::InvalidArgument(
                "card number must contain only digits".to_string(),
            ));
        }
        Ok(())
    }

    fn into_batch(items: Vec<SyncItem<Self>>) -> SyncBatch {
        SyncBatch::Cards(items)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
