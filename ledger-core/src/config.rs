//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding chain snapshots
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Replica names
    pub node_names: Vec<String>,

    /// Seed chain configuration
    pub seed: SeedConfig,

    /// Snapshot configuration
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            service_name: "smartlog-ledger".to_string(),
            node_names: vec![
                "Node_A".to_string(),
                "Node_B".to_string(),
                "Node_C".to_string(),
            ],
            seed: SeedConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Seed chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Maximum number of seed events turned into blocks
    pub max_blocks: usize,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            max_blocks: crate::chain::DEFAULT_SEED_LIMIT,
        }
    }
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Pretty-print JSON snapshots
    pub pretty_json: bool,

    /// Save every replica after each mutation
    pub autosave: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pretty_json: true,
            autosave: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("SMARTLOG_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(nodes) = std::env::var("SMARTLOG_NODES") {
            config.node_names = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check node names are present and unique
    pub fn validate(&self) -> crate::Result<()> {
        if self.node_names.is_empty() {
            return Err(crate::Error::Config("At least one node is required".to_string()));
        }
        let mut names = self.node_names.clone();
        names.sort();
        names.dedup();
        if names.len() != self.node_names.len() {
            return Err(crate::Error::Config("Node names must be unique".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "smartlog-ledger");
        assert_eq!(config.node_names.len(), 3);
        assert_eq!(config.seed.max_blocks, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            node_names = ["North", "South"]

            [storage]
            autosave = true
            "#,
        )
        .unwrap();

        assert_eq!(config.node_names, vec!["North", "South"]);
        assert!(config.storage.autosave);
        assert!(config.storage.pretty_json);
        assert_eq!(config.data_dir, PathBuf::from("./data/ledger"));
    }

    #[test]
    fn test_duplicate_nodes_invalid() {
        let config = Config {
            node_names: vec!["A".to_string(), "A".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
