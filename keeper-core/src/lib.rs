//! Keeper Core Library
//!
//! Offline-first secret vault: local per-type stores, the identity cache,
//! the outbox of unconfirmed mutations and the worker that drains it to
//! the server of record.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod identity;
pub mod store;
pub mod sync;
pub mod vault;

pub use auth::{Authenticator, LoginMode, Session};
pub use config::ClientConfig;
pub use database::models::{
    BlobPayload, CardPayload, CredentialPayload, NotePayload, Secret, SecretRecord,
};
pub use database::Database;
pub use sync::models::{OutboxAction, SecretKind};
pub use vault::Vault;

use thiserror::Error;

/// Result type for keeper operations
pub type Result<T> = std::result::Result<T, KeeperError>;

/// General error type for keeper operations
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeeperError {
    /// Shorthand for a lock poisoned by a panicking holder.
    pub(crate) fn lock_poisoned(context: &str) -> Self {
        Self::Internal(format!("Database lock poisoned: {}", context))
    }
}
