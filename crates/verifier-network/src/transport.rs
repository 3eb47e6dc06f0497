//! Transport seam used by the replication layer
//!
//! A transport opens ordered bidirectional streams to peers on the signature
//! protocol and publishes on the announcement topic. What arrives from the
//! network (inbound streams, announcements) is delivered through the
//! channels in [`TransportEvents`].

use async_trait::async_trait;
use libp2p::PeerId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::Result;

/// Stream protocol for find-common and exchange sessions
pub const SIGNATURE_PROTOCOL: &str = "/optimism-verifier/signatures/1.0.0";

/// Gossip topic carrying per-signer tips
pub const ANNOUNCEMENT_TOPIC: &str = "/optimism-verifier/latest-signatures/1.0.0";

#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn local_peer_id(&self) -> PeerId;

    async fn open_stream(&self, peer: PeerId) -> Result<Self::Stream>;

    /// Publish an encoded envelope on the announcement topic
    async fn publish(&self, data: Vec<u8>) -> Result<()>;
}

/// A message received on the announcement topic
#[derive(Clone, Debug)]
pub struct Announcement {
    /// Originator of the message
    pub source: PeerId,
    pub data: Vec<u8>,
}

/// Inbound side of a transport
pub struct TransportEvents<S> {
    pub streams: mpsc::Receiver<(PeerId, S)>,
    pub announcements: mpsc::Receiver<Announcement>,
}
