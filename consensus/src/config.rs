//! Configuration for consensus rounds and node services

use crate::engine::DeliveryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Node ID, used as the audit actor and as the served replica name
    pub node_id: String,

    /// Required affirmative votes
    pub quorum: usize,

    /// Which replicas receive committed blocks
    pub delivery: DeliveryPolicy,

    /// Vote transport configuration
    pub transport: TransportConfig,

    /// Node service configuration
    pub node: NodeConfig,

    /// Ledger configuration
    pub ledger: smartlog_ledger::Config,
}

/// Vote transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Votes computed against local replicas
    #[default]
    InProcess,
    /// Votes requested from node services over HTTP
    Http,
}

/// Vote transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport mode
    pub mode: TransportMode,

    /// Base URL per replica name (HTTP mode)
    pub endpoints: BTreeMap<String, String>,

    /// Per-request timeout (ms)
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::InProcess,
            endpoints: BTreeMap::new(),
            timeout_ms: 2000,
        }
    }
}

impl TransportConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Node service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP listen address
    pub listen_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5001".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "Node_A".to_string(),
            quorum: 2,
            delivery: DeliveryPolicy::AllReplicas,
            transport: TransportConfig::default(),
            node: NodeConfig::default(),
            ledger: smartlog_ledger::Config::default(),
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
        let mut config = Config {
            ledger: smartlog_ledger::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(node_id) = std::env::var("SMARTLOG_NODE_ID") {
            config.node_id = node_id;
        }

        if let Ok(quorum) = std::env::var("SMARTLOG_QUORUM") {
            config.quorum = quorum
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid SMARTLOG_QUORUM: {}", e)))?;
        }

        if let Ok(listen_addr) = std::env::var("SMARTLOG_LISTEN_ADDR") {
            config.node.listen_addr = listen_addr;
        }

        // Format: Node_A=http://host:5001,Node_B=http://host:5002
        if let Ok(endpoints) = std::env::var("SMARTLOG_ENDPOINTS") {
            config.transport.mode = TransportMode::Http;
            config.transport.endpoints = parse_endpoints(&endpoints)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the quorum fits the configured replicas
    pub fn validate(&self) -> crate::Result<()> {
        self.ledger.validate()?;
        crate::engine::check_quorum(self.quorum, self.ledger.node_names.len())?;

        if self.transport.mode == TransportMode::Http {
            if let Some(missing) = self
                .ledger
                .node_names
                .iter()
                .find(|name| !self.transport.endpoints.contains_key(*name))
            {
                return Err(crate::Error::Config(format!("No endpoint for {missing}")));
            }
        }
        Ok(())
    }
}

fn parse_endpoints(raw: &str) -> crate::Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, url)| (name.trim().to_string(), url.trim().to_string()))
                .ok_or_else(|| crate::Error::Config(format!("Invalid endpoint entry: {entry}")))
        })
        .collect()
}
