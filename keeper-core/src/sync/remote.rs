//! The server of record as seen by the client.

use crate::sync::models::{SyncAck, SyncBatch};
use crate::Result;
use async_trait::async_trait;

/// Operations the client needs from the server.
///
/// [`crate::sync::client::HttpRemote`] talks HTTP; tests substitute
/// in-process fakes.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Create an account and return the server-side user id.
    async fn register(&self, login: &str, password: &str) -> Result<i64>;

    /// Exchange credentials for a fresh access token.
    async fn authenticate(&self, login: &str, password: &str) -> Result<String>;

    /// Liveness probe. Any error means the client should work offline.
    async fn health(&self) -> Result<()>;

    /// Send one batch to the replication endpoint of its kind.
    async fn replicate(&self, batch: &SyncBatch) -> Result<SyncAck>;
}
