//! # Optimism Verifier Node
//!
//! Runs a verifier's signature log on the peer-to-peer network: local
//! attestations are appended to the node's own chain, and every other
//! signer's chain is replicated from peers.

pub mod attestor;
pub mod config;
pub mod keys;
pub mod node;

pub use attestor::{Attestor, BatchVerdict};
pub use config::{LogFormat, LoggingConfig, NodeConfig, StorageBackend};
pub use node::{open_log, NodeState, VerifierNode};
