//! # Verifier Sync
//!
//! Keeps every node's attestation log converged with its peers':
//!
//! 1. Nodes publish the tip of each eligible signer's chain.
//! 2. A node seeing a tip it lacks opens a session with the announcer.
//! 3. The session locates the newest record both sides share for each
//!    signer, then pulls everything after it in acked pages.
//! 4. Pulled records are replayed parents first and saved under the
//!    sender's ids, so chains stay identical across nodes.

pub mod ancestor;
pub mod announce;
pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod replicator;
pub mod responder;
pub mod scheduler;
pub mod session;
pub mod signer_set;
pub mod stats;

pub use ancestor::{find_common, find_common_ancestor};
pub use announce::{decode_announcement, latest_tips, publish_latest, signers_to_sync};
pub use config::{InboundLimits, OutboundLimits, SyncConfig};
pub use context::SyncContext;
pub use error::{Result, SyncError};
pub use exchange::{apply_records, request_exchange, serve_exchange};
pub use replicator::{Replicator, ReplicatorHandle};
pub use responder::handle_stream;
pub use scheduler::SyncScheduler;
pub use session::sync_with_peer;
pub use signer_set::{
    run_stake_refresh, AllowAll, SignerSet, StakeCache, StakeSource, Stakeholder,
    StaticStakeSource,
};
pub use stats::{ApplyOutcome, SyncStats};
