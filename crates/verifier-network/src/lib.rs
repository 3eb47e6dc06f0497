//! # Verifier Network
//!
//! Peer-to-peer plumbing for signature replication:
//!
//! - `message` - wire envelopes (find-common, exchange, ack, end of messages)
//! - `framing` - length-delimited envelope streams
//! - `transport` - the `StreamTransport` seam the replication layer runs on
//! - `swarm` - libp2p implementation (gossipsub + identify + protocol streams)
//! - `memory` - in-process implementation for tests and simulation
//! - `limiter` - token-bucket stream admission throttling

pub mod error;
pub mod framing;
pub mod limiter;
pub mod memory;
pub mod message;
pub mod swarm;
pub mod transport;

pub use error::{NetworkError, Result};
pub use framing::EnvelopeStream;
pub use limiter::RateLimiter;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use message::{
    Envelope, ExchangeRequest, FindCommonSignature, Misc, SignatureExchange, MISC_SIG_RECEIVED,
};
pub use swarm::{GossipSubConfig, P2pStream, P2pTransport, SwarmConfig, SwarmRuntime, SwarmStats};
pub use transport::{
    Announcement, StreamTransport, TransportEvents, ANNOUNCEMENT_TOPIC, SIGNATURE_PROTOCOL,
};

pub use libp2p::{Multiaddr, PeerId};
