//! Argon2id password hashing.
//!
//! Hashes are self-describing PHC strings (`$argon2id$v=19$m=...`), so
//! verification never needs the parameters passed back in. The server
//! stores them for registered users and the client caches them for
//! offline login.

use crate::{KeeperError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Parameters for Argon2id hashing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashParams {
    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of iterations)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            mem_cost: 19_456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl HashParams {
    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < 8 * self.parallelism {
            return Err(KeeperError::PasswordHash(
                "Memory cost too low for the requested parallelism".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(KeeperError::PasswordHash(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(KeeperError::PasswordHash(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }

    fn hasher(&self) -> Result<Argon2<'static>> {
        self.validate()?;
        let params = Params::new(self.mem_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| KeeperError::PasswordHash(format!("Invalid parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a password with default parameters and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    hash_password_with(password, &HashParams::default())
}

/// Hash a password with explicit parameters and a fresh random salt.
pub fn hash_password_with(password: &str, params: &HashParams) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| KeeperError::PasswordHash(format!("Hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string.
///
/// Returns `Ok(false)` on mismatch; errors only when the stored hash is
/// unreadable.
pub fn verify_password(password: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| KeeperError::PasswordHash(format!("Corrupt password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(KeeperError::PasswordHash(e.to_string())),
    }
}
