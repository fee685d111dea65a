//! Keeper server of record.
//!
//! Stores every user's secrets, issues access tokens and applies the
//! replication batches that clients drain from their outboxes.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use server::{build_router, AppState};
pub use storage::ServerStorage;
