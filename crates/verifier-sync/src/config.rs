//! Replication tuning

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sync settings shared by the requester and responder sides
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Pointers per common-ancestor request
    #[serde(default = "default_finder_page_size")]
    pub finder_page_size: usize,

    /// Records per exchange response page
    #[serde(default = "default_exchange_page_size")]
    pub exchange_page_size: usize,

    /// How far `id_after` is rewound behind the common ancestor
    #[serde(default = "default_id_after_margin_ms")]
    pub id_after_margin_ms: u64,

    /// Wait for any single message on a stream
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,

    /// Tip announcement period; 0 disables publishing
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Most signer tips carried by one announcement
    #[serde(default = "default_max_announced_signers")]
    pub max_announced_signers: usize,

    #[serde(default)]
    pub inbound: InboundLimits,

    #[serde(default)]
    pub outbound: OutboundLimits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            finder_page_size: default_finder_page_size(),
            exchange_page_size: default_exchange_page_size(),
            id_after_margin_ms: default_id_after_margin_ms(),
            stream_timeout_ms: default_stream_timeout_ms(),
            publish_interval_ms: default_publish_interval_ms(),
            max_announced_signers: default_max_announced_signers(),
            inbound: InboundLimits::default(),
            outbound: OutboundLimits::default(),
        }
    }
}

impl SyncConfig {
    pub fn id_after_margin(&self) -> Duration {
        Duration::from_millis(self.id_after_margin_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn publish_interval(&self) -> Option<Duration> {
        (self.publish_interval_ms > 0).then(|| Duration::from_millis(self.publish_interval_ms))
    }
}

/// Limits on streams opened by peers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundLimits {
    /// Streams served at once; excess streams are rejected
    #[serde(default = "default_inbound_concurrency")]
    pub concurrency: usize,

    /// Streams admitted per peer per second; 0 means unlimited
    #[serde(default = "default_inbound_throttling")]
    pub throttling: u32,

    /// Upper bound on a single outgoing write
    #[serde(default = "default_max_send_time_ms")]
    pub max_send_time_ms: u64,
}

impl Default for InboundLimits {
    fn default() -> Self {
        Self {
            concurrency: default_inbound_concurrency(),
            throttling: default_inbound_throttling(),
            max_send_time_ms: default_max_send_time_ms(),
        }
    }
}

impl InboundLimits {
    pub fn max_send_time(&self) -> Duration {
        Duration::from_millis(self.max_send_time_ms)
    }
}

/// Limits on sessions this node opens
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundLimits {
    /// Sessions running at once; excess sessions wait
    #[serde(default = "default_outbound_concurrency")]
    pub concurrency: usize,

    /// Sessions started per second; 0 means unlimited
    #[serde(default = "default_outbound_throttling")]
    pub throttling: u32,
}

impl Default for OutboundLimits {
    fn default() -> Self {
        Self {
            concurrency: default_outbound_concurrency(),
            throttling: default_outbound_throttling(),
        }
    }
}

fn default_finder_page_size() -> usize {
    50
}
fn default_exchange_page_size() -> usize {
    100
}
fn default_id_after_margin_ms() -> u64 {
    1_000
}
fn default_stream_timeout_ms() -> u64 {
    10_000
}
fn default_publish_interval_ms() -> u64 {
    10_000
}
fn default_max_announced_signers() -> usize {
    1_000
}
fn default_inbound_concurrency() -> usize {
    16
}
fn default_inbound_throttling() -> u32 {
    50
}
fn default_max_send_time_ms() -> u64 {
    5_000
}
fn default_outbound_concurrency() -> usize {
    8
}
fn default_outbound_throttling() -> u32 {
    20
}
