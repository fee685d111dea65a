//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `token_secret`.
pub const TOKEN_SECRET_ENV: &str = "KEEPER_TOKEN_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    /// HMAC secret for issued tokens. Must be set before serving.
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8081".to_string(),
            storage_path: PathBuf::from("keeper-server.db"),
            token_secret: String::new(),
            token_ttl_hours: 24,
            max_payload_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Take the token secret from the environment when it is set there.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(TOKEN_SECRET_ENV) {
            if !secret.is_empty() {
                self.token_secret = secret;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token_secret.is_empty() {
            anyhow::bail!(
                "token secret not configured (set token_secret or {})",
                TOKEN_SECRET_ENV
            );
        }
        if self.token_ttl_hours <= 0 {
            anyhow::bail!("token_ttl_hours must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_need_a_secret() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.token_ttl_hours, 24);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper-server.toml");
        std::fs::write(
            &path,
            "listen_addr = \"0.0.0.0:9000\"\ntoken_secret = \"s3cr3t\"\n",
        )
        .unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9000");
        assert_eq!(cfg.max_payload_size, 1024 * 1024);
        cfg.validate().unwrap();
    }
}
