//! Client configuration.

use crate::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub database_path: PathBuf,
    pub sync_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8081".to_string(),
            database_path: PathBuf::from("keeper.db"),
            sync_interval_ms: 1_000,
            request_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KeeperError::InvalidArgument(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");
        std::fs::write(&path, "server_url = \"http://vault.example:9000\"\n").unwrap();

        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.server_url, "http://vault.example:9000");
        assert_eq!(cfg.sync_interval(), Duration::from_secs(1));
        assert_eq!(cfg.database_path, PathBuf::from("keeper.db"));
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keeper.toml");
        std::fs::write(&path, "sync_interval_ms = \"soon\"").unwrap();
        assert!(matches!(
            ClientConfig::load(&path),
            Err(KeeperError::InvalidArgument(_))
        ));
    }
}
