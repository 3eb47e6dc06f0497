//! Node configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use verifier_core::verifying_key_from_hex;
use verifier_network::{GossipSubConfig, Multiaddr, SwarmConfig};
use verifier_sync::{Stakeholder, SyncConfig};

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSettings,

    /// Peer-to-peer transport
    #[serde(default)]
    pub p2p: P2pConfig,

    /// Replication tuning
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Stake table and verification
    #[serde(default)]
    pub signers: SignersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Read a TOML file; missing sections and fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.node.data_dir)
    }

    /// Swarm settings with the node's identity seed
    pub fn swarm_config(&self, identity_seed: [u8; 32]) -> anyhow::Result<SwarmConfig> {
        let listen_addrs = parse_addrs(&self.p2p.listens)?;
        let bootnodes = parse_addrs(&self.p2p.bootnodes)?;
        Ok(SwarmConfig {
            listen_addrs,
            bootnodes,
            gossipsub: GossipSubConfig {
                heartbeat_interval: Duration::from_millis(self.p2p.gossip_heartbeat_ms),
                mesh_n: self.p2p.mesh_n,
                mesh_n_low: self.p2p.mesh_n.saturating_sub(2).max(1),
                mesh_n_high: self.p2p.mesh_n * 2,
                ..Default::default()
            },
            idle_connection_timeout: Duration::from_secs(self.p2p.idle_timeout_secs),
            identity_seed: Some(identity_seed),
        })
    }
}

fn parse_addrs(addrs: &[String]) -> anyhow::Result<Vec<Multiaddr>> {
    addrs
        .iter()
        .map(|a| {
            a.parse::<Multiaddr>()
                .map_err(|e| anyhow::anyhow!("invalid multiaddr {}: {}", a, e))
        })
        .collect()
}

/// Node operation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Chain the attestations are signed for
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_node_name() -> String {
    "optimism-verifier".to_string()
}

fn default_chain_id() -> u64 {
    248
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            chain_id: default_chain_id(),
            data_dir: default_data_dir(),
        }
    }
}

/// P2P configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Listen multiaddrs
    #[serde(default = "default_listens")]
    pub listens: Vec<String>,

    /// Peers dialed on startup, as `/ip4/../p2p/<peer id>` multiaddrs
    #[serde(default)]
    pub bootnodes: Vec<String>,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_gossip_heartbeat")]
    pub gossip_heartbeat_ms: u64,

    /// Target gossip mesh degree
    #[serde(default = "default_mesh_n")]
    pub mesh_n: usize,
}

fn default_listens() -> Vec<String> {
    vec![
        "/ip4/0.0.0.0/tcp/4101".to_string(),
        "/ip4/0.0.0.0/udp/4101/quic-v1".to_string(),
    ]
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_gossip_heartbeat() -> u64 {
    1_000
}

fn default_mesh_n() -> usize {
    6
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listens: default_listens(),
            bootnodes: Vec::new(),
            idle_timeout_secs: default_idle_timeout(),
            gossip_heartbeat_ms: default_gossip_heartbeat(),
            mesh_n: default_mesh_n(),
        }
    }
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Rocksdb,
    /// Nothing survives a restart
    Memory,
}

/// Storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Database directory; `<data_dir>/db` when unset
    #[serde(default)]
    pub path: Option<String>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Rocksdb
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// One configured stakeholder
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakeholderEntry {
    /// Hex Ed25519 verifying key
    pub public_key: String,
    pub stake: u64,
    #[serde(default = "default_true")]
    pub candidate: bool,
}

/// Signer eligibility and signature verification
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignersConfig {
    /// Check signature bytes of received records
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Stake a candidate needs to be eligible
    #[serde(default)]
    pub min_stake: u64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Empty table: every signer is eligible
    #[serde(default)]
    pub stakeholders: Vec<StakeholderEntry>,
}

fn default_true() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    300
}

impl Default for SignersConfig {
    fn default() -> Self {
        Self {
            verify: true,
            min_stake: 0,
            refresh_interval_secs: default_refresh_interval(),
            stakeholders: Vec::new(),
        }
    }
}

impl SignersConfig {
    pub fn stakeholders(&self) -> anyhow::Result<Vec<Stakeholder>> {
        self.stakeholders
            .iter()
            .map(|entry| {
                let key = verifying_key_from_hex(&entry.public_key)?;
                Ok(Stakeholder::new(key, entry.stake, entry.candidate))
            })
            .collect()
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_takes_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            [node]
            chain_id = 12345

            [sync]
            exchange_page_size = 20

            [sync.inbound]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.node.chain_id, 12345);
        assert_eq!(config.node.name, "optimism-verifier");
        assert_eq!(config.sync.exchange_page_size, 20);
        assert_eq!(config.sync.finder_page_size, 50);
        assert_eq!(config.sync.inbound.concurrency, 2);
        assert_eq!(config.storage.backend, StorageBackend::Rocksdb);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = NodeConfig::default();
        config.logging.format = LogFormat::Json;
        config.storage.backend = StorageBackend::Memory;
        let parsed = NodeConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.logging.format, LogFormat::Json);
        assert_eq!(parsed.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_swarm_config_rejects_bad_multiaddr() {
        let mut config = NodeConfig::default();
        assert_eq!(config.swarm_config([1; 32]).unwrap().listen_addrs.len(), 2);

        config.p2p.bootnodes = vec!["not-an-addr".to_string()];
        assert!(config.swarm_config([1; 32]).is_err());
    }

    #[test]
    fn test_stakeholders_parse_keys() {
        let mut config = SignersConfig::default();
        config.stakeholders.push(StakeholderEntry {
            public_key: "zz".to_string(),
            stake: 1,
            candidate: true,
        });
        assert!(config.stakeholders().is_err());
    }
}
