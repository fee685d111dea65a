//! Cryptographic primitives for the keeper vault.
//!
//! Only one-way password hashing lives here. Secret payloads are stored
//! as plain rows; at-rest encryption is not part of this crate.

pub mod kdf;

pub use kdf::{hash_password, hash_password_with, verify_password, HashParams};
