//! In-memory transport for tests and local simulation
//!
//! A shared [`MemoryNetwork`] broker routes `tokio::io::duplex` streams and
//! announcement broadcasts between the transports that joined it.

use async_trait::async_trait;
use libp2p::PeerId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::error::{NetworkError, Result};
use crate::transport::{Announcement, StreamTransport, TransportEvents};

const DUPLEX_BUF_SIZE: usize = 64 * 1024;
const STREAM_QUEUE: usize = 64;
const ANNOUNCEMENT_QUEUE: usize = 256;

#[derive(Clone)]
struct PeerHandle {
    streams: mpsc::Sender<(PeerId, DuplexStream)>,
    announcements: mpsc::Sender<Announcement>,
}

/// Shared broker between [`MemoryTransport`]s
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<RwLock<HashMap<PeerId, PeerHandle>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join with a random peer id
    pub fn join(&self) -> (MemoryTransport, TransportEvents<DuplexStream>) {
        self.join_as(PeerId::random())
    }

    pub fn join_as(&self, peer_id: PeerId) -> (MemoryTransport, TransportEvents<DuplexStream>) {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_QUEUE);
        let (announce_tx, announce_rx) = mpsc::channel(ANNOUNCEMENT_QUEUE);
        self.peers.write().insert(
            peer_id,
            PeerHandle {
                streams: stream_tx,
                announcements: announce_tx,
            },
        );
        let transport = MemoryTransport {
            peer_id,
            network: self.clone(),
        };
        let events = TransportEvents {
            streams: stream_rx,
            announcements: announce_rx,
        };
        (transport, events)
    }

    /// Remove a peer; later streams to it fail to open
    pub fn leave(&self, peer_id: &PeerId) {
        self.peers.write().remove(peer_id);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

/// One peer's handle on a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    peer_id: PeerId,
    network: MemoryNetwork,
}

#[async_trait]
impl StreamTransport for MemoryTransport {
    type Stream = DuplexStream;

    fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn open_stream(&self, peer: PeerId) -> Result<Self::Stream> {
        let handle = self
            .network
            .peers
            .read()
            .get(&peer)
            .cloned()
            .ok_or_else(|| NetworkError::OpenStream {
                peer,
                reason: "peer not in network".to_string(),
            })?;

        let (mine, theirs) = tokio::io::duplex(DUPLEX_BUF_SIZE);
        handle
            .streams
            .send((self.peer_id, theirs))
            .await
            .map_err(|_| NetworkError::OpenStream {
                peer,
                reason: "peer stopped accepting streams".to_string(),
            })?;
        Ok(mine)
    }

    async fn publish(&self, data: Vec<u8>) -> Result<()> {
        let targets: Vec<(PeerId, PeerHandle)> = self
            .network
            .peers
            .read()
            .iter()
            .filter(|(id, _)| **id != self.peer_id)
            .map(|(id, h)| (*id, h.clone()))
            .collect();

        for (peer, handle) in targets {
            let announcement = Announcement {
                source: self.peer_id,
                data: data.clone(),
            };
            // gossip is lossy; a full queue drops the message
            if handle.announcements.try_send(announcement).is_err() {
                tracing::debug!("Dropped announcement to {}", peer);
            }
        }
        Ok(())
    }
}
