//! Local database layer.
//!
//! Schema management for the client-side SQLite file, plus the secret
//! models shared with the server.

pub mod models;
pub mod schema;

pub use models::{Secret, SecretRecord};
pub use schema::Database;
