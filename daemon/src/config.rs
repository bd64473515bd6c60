//! Daemon configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::consensus::supermajority::ConsistencyModel;
use crate::storage::storage::StorageOptions;

pub const DEFAULT_ROTATE_PERIOD: u32 = 10;
pub const DEFAULT_VOTE_DELAY_MS: u64 = 5000;

fn default_vote_delay_ms() -> u64 {
    DEFAULT_VOTE_DELAY_MS
}

fn default_rotate_period() -> u32 {
    DEFAULT_ROTATE_PERIOD
}

fn default_prepared_commits() -> bool {
    true
}

// hot read-mostly path families worth caching
fn default_cacheable_paths() -> Vec<String> {
    vec![
        "wsv/network/peers/".to_string(),
        "wsv/r/".to_string(),
        "wsv/stg/".to_string(),
        "wsv/tbi".to_string(),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Fault model of the deployment; decides the supermajority arithmetic.
    #[serde(default)]
    pub consistency_model: ConsistencyModel,

    /// Delay between two voting attempts for the same round.
    #[serde(default = "default_vote_delay_ms")]
    pub vote_delay_ms: u64,

    /// Voting attempts before the engine abstains and re-votes.
    #[serde(default = "default_rotate_period")]
    pub rotate_period: u32,

    #[serde(default = "default_prepared_commits")]
    pub prepared_commits_enabled: bool,

    #[serde(default = "default_cacheable_paths")]
    pub cacheable_paths: Vec<String>,

    pub block_store_path: PathBuf,

    pub database_path: PathBuf,

    /// Transport bind address, e.g. `0.0.0.0:50541`.
    pub listen_address: String,

    /// Hex-encoded ed25519 secret key of this peer.
    pub secret_key: String,

    /// JSON file with the genesis block; applied once on an empty chain.
    #[serde(default)]
    pub genesis_path: Option<PathBuf>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn storage_options(&self) -> StorageOptions {
        StorageOptions {
            prepared_commits_enabled: self.prepared_commits_enabled,
            cacheable_paths: self.cacheable_paths.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let config: NodeConfig = serde_json::from_str(
            r#"{
                "block_store_path": "/tmp/blocks",
                "database_path": "/tmp/db",
                "listen_address": "127.0.0.1:50541",
                "secret_key": "00"
            }"#,
        )
        .unwrap();
        assert_eq!(config.consistency_model, ConsistencyModel::Bft);
        assert_eq!(config.rotate_period, DEFAULT_ROTATE_PERIOD);
        assert_eq!(config.vote_delay_ms, DEFAULT_VOTE_DELAY_MS);
        assert!(config.prepared_commits_enabled);
        assert!(!config.cacheable_paths.is_empty());
        assert!(config.genesis_path.is_none());
    }

    #[test]
    fn test_explicit_model() {
        let config: NodeConfig = serde_json::from_str(
            r#"{
                "consistency_model": "cft",
                "prepared_commits_enabled": false,
                "block_store_path": "/tmp/blocks",
                "database_path": "/tmp/db",
                "listen_address": "127.0.0.1:50541",
                "secret_key": "00"
            }"#,
        )
        .unwrap();
        assert_eq!(config.consistency_model, ConsistencyModel::Cft);
        assert!(!config.storage_options().prepared_commits_enabled);
    }
}
