//! Offline-first replication.
//!
//! - Outbox of local mutations awaiting confirmation
//! - PushData: resolve, batch per secret type, send, clear acknowledged entries
//! - Background worker driven by a timer and a post-login signal
//! - HTTP transport to the server of record

#[cfg(feature = "sync")]
pub mod client;
pub mod engine;
pub mod models;
pub mod outbox;
pub mod remote;
pub mod worker;

#[cfg(feature = "sync")]
pub use client::HttpRemote;
pub use engine::{GroupReport, PushOutcome, PushReport, Pusher};
pub use models::{OutboxAction, SecretKind, SyncAck, SyncBatch, SyncItem};
pub use outbox::OutboxEntry;
pub use remote::Remote;
pub use worker::{login_channel, LoginEvent, LoginNotifier, SyncWorker};

#[cfg(test)]
pub(crate) mod testing;
