//! # libp2p Swarm Runtime
//!
//! Wires gossipsub (tip announcements), identify and raw protocol streams
//! (find-common and exchange sessions) into one swarm driven by a single
//! event loop task.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    VERIFIER SWARM RUNTIME                    │
//! │                                                              │
//! │   ┌────────────┐   ┌────────────┐   ┌──────────────────┐     │
//! │   │ GossipSub  │   │  Identify  │   │  libp2p-stream   │     │
//! │   │ (tips)     │   │            │   │  (sessions)      │     │
//! │   └─────┬──────┘   └─────┬──────┘   └────────┬─────────┘     │
//! │         └────────────────┼───────────────────┘               │
//! │                ┌─────────┴─────────┐                         │
//! │                │ VerifierBehaviour │                         │
//! │                └─────────┬─────────┘                         │
//! │                ┌─────────┴─────────┐                         │
//! │                │   libp2p Swarm    │  TCP + QUIC             │
//! │                └─────────┬─────────┘                         │
//! │        announcements ◄───┴───► inbound streams (mpsc)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identify, noise,
    swarm::{NetworkBehaviour, SwarmEvent},
    tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm, SwarmBuilder,
};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};
use tracing::{debug, error, info, warn};

use crate::error::NetworkError;
use crate::transport::{
    Announcement, StreamTransport, TransportEvents, ANNOUNCEMENT_TOPIC, SIGNATURE_PROTOCOL,
};

const STREAM_PROTOCOL: StreamProtocol = StreamProtocol::new(SIGNATURE_PROTOCOL);

/// Protocol stream as seen by tokio
pub type P2pStream = Compat<libp2p::Stream>;

// ============================================================================
// SWARM CONFIGURATION
// ============================================================================

#[derive(Clone, Debug)]
pub struct SwarmConfig {
    pub listen_addrs: Vec<Multiaddr>,

    /// Peers dialed on startup
    pub bootnodes: Vec<Multiaddr>,

    pub gossipsub: GossipSubConfig,

    pub idle_connection_timeout: Duration,

    /// Node identity seed (32 bytes); random when absent
    pub identity_seed: Option<[u8; 32]>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_addrs: Vec::new(),
            bootnodes: Vec::new(),
            gossipsub: GossipSubConfig::default(),
            idle_connection_timeout: Duration::from_secs(60),
            identity_seed: None,
        }
    }
}

/// GossipSub-specific configuration
#[derive(Clone, Debug)]
pub struct GossipSubConfig {
    pub heartbeat_interval: Duration,
    pub max_transmit_size: usize,
    pub mesh_n: usize,
    pub mesh_n_low: usize,
    pub mesh_n_high: usize,
    pub duplicate_cache_time: Duration,
}

impl Default for GossipSubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            max_transmit_size: 1024 * 1024,
            mesh_n: 6,
            mesh_n_low: 4,
            mesh_n_high: 12,
            duplicate_cache_time: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// BEHAVIOUR
// ============================================================================

#[derive(NetworkBehaviour)]
pub struct VerifierBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
    pub stream: libp2p_stream::Behaviour,
}

// ============================================================================
// COMMANDS & STATS
// ============================================================================

#[derive(Debug)]
pub enum SwarmCommand {
    Publish {
        data: Vec<u8>,
        response: oneshot::Sender<crate::error::Result<()>>,
    },
    Dial {
        addr: Multiaddr,
    },
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct SwarmStats {
    pub local_peer_id: String,
    pub connected_peers: usize,
    pub announcements_published: u64,
    pub announcements_received: u64,
    pub inbound_streams: u64,
    pub uptime_secs: u64,
}

// ============================================================================
// TRANSPORT HANDLE
// ============================================================================

/// [`StreamTransport`] backed by the running swarm
#[derive(Clone)]
pub struct P2pTransport {
    local_peer_id: PeerId,
    control: libp2p_stream::Control,
    command_tx: mpsc::Sender<SwarmCommand>,
}

#[async_trait]
impl StreamTransport for P2pTransport {
    type Stream = P2pStream;

    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn open_stream(&self, peer: PeerId) -> crate::error::Result<Self::Stream> {
        let mut control = self.control.clone();
        let stream = control
            .open_stream(peer, STREAM_PROTOCOL)
            .await
            .map_err(|e| NetworkError::OpenStream {
                peer,
                reason: e.to_string(),
            })?;
        Ok(stream.compat())
    }

    async fn publish(&self, data: Vec<u8>) -> crate::error::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(SwarmCommand::Publish { data, response: tx })
            .await
            .map_err(|e| NetworkError::Channel(e.to_string()))?;
        rx.await
            .map_err(|e| NetworkError::Channel(e.to_string()))?
    }
}

// ============================================================================
// RUNTIME
// ============================================================================

pub struct SwarmRuntime {
    local_peer_id: PeerId,
    command_tx: mpsc::Sender<SwarmCommand>,
    stats: Arc<RwLock<SwarmStats>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SwarmRuntime {
    /// Build the swarm, start listening and spawn the event loop
    pub async fn start(
        config: SwarmConfig,
    ) -> crate::error::Result<(Self, P2pTransport, TransportEvents<P2pStream>)> {
        info!("Starting verifier swarm runtime...");

        let local_keypair = match config.identity_seed {
            Some(seed) => libp2p::identity::Keypair::ed25519_from_bytes(seed)
                .map_err(|e| NetworkError::Config(format!("Invalid identity seed: {}", e)))?,
            None => libp2p::identity::Keypair::generate_ed25519(),
        };
        let local_peer_id = PeerId::from(local_keypair.public());
        info!("Local peer ID: {}", local_peer_id);

        let mut swarm = Self::build_swarm(&config, local_keypair)?;

        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&IdentTopic::new(ANNOUNCEMENT_TOPIC))
            .map_err(|e| NetworkError::Config(format!("Subscribe error: {:?}", e)))?;

        for addr in &config.listen_addrs {
            swarm
                .listen_on(addr.clone())
                .map_err(|e| NetworkError::Config(format!("Failed to listen on {}: {}", addr, e)))?;
        }
        for addr in &config.bootnodes {
            match swarm.dial(addr.clone()) {
                Ok(_) => info!("Dialing bootnode {}", addr),
                Err(e) => warn!("Failed to dial bootnode {}: {}", addr, e),
            }
        }

        let mut control = swarm.behaviour().stream.new_control();
        let mut incoming = control
            .accept(STREAM_PROTOCOL)
            .map_err(|e| NetworkError::Config(e.to_string()))?;

        let (stream_tx, stream_rx) = mpsc::channel(64);
        let (announce_tx, announce_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(256);
        let stats = Arc::new(RwLock::new(SwarmStats {
            local_peer_id: local_peer_id.to_string(),
            ..Default::default()
        }));

        let accept_stats = stats.clone();
        let accept_task = tokio::spawn(async move {
            while let Some((peer, stream)) = incoming.next().await {
                accept_stats.write().inbound_streams += 1;
                if stream_tx.send((peer, stream.compat())).await.is_err() {
                    break;
                }
            }
            debug!("Inbound stream acceptor finished");
        });

        let loop_stats = stats.clone();
        let loop_task = tokio::spawn(async move {
            Self::run_event_loop(swarm, command_rx, announce_tx, loop_stats).await;
        });

        let transport = P2pTransport {
            local_peer_id,
            control,
            command_tx: command_tx.clone(),
        };
        let events = TransportEvents {
            streams: stream_rx,
            announcements: announce_rx,
        };
        let runtime = Self {
            local_peer_id,
            command_tx,
            stats,
            tasks: vec![accept_task, loop_task],
        };
        info!("Verifier swarm runtime started");
        Ok((runtime, transport, events))
    }

    fn build_swarm(
        config: &SwarmConfig,
        local_keypair: libp2p::identity::Keypair,
    ) -> crate::error::Result<Swarm<VerifierBehaviour>> {
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(config.gossipsub.heartbeat_interval)
            .max_transmit_size(config.gossipsub.max_transmit_size)
            .mesh_n(config.gossipsub.mesh_n)
            .mesh_n_low(config.gossipsub.mesh_n_low)
            .mesh_n_high(config.gossipsub.mesh_n_high)
            .duplicate_cache_time(config.gossipsub.duplicate_cache_time)
            .validation_mode(ValidationMode::Strict)
            .build()
            .map_err(|e| NetworkError::Config(format!("GossipSub config error: {}", e)))?;

        let gossipsub = gossipsub::Behaviour::new(
            MessageAuthenticity::Signed(local_keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| NetworkError::Config(format!("GossipSub init error: {}", e)))?;

        let identify = identify::Behaviour::new(identify::Config::new(
            "/optimism-verifier/1.0.0".to_string(),
            local_keypair.public(),
        ));

        let behaviour = VerifierBehaviour {
            gossipsub,
            identify,
            stream: libp2p_stream::Behaviour::new(),
        };

        let idle_timeout = config.idle_connection_timeout;
        let swarm = SwarmBuilder::with_existing_identity(local_keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| NetworkError::Config(format!("TCP transport error: {}", e)))?
            .with_quic()
            .with_behaviour(|_| behaviour)
            .map_err(|e| NetworkError::Config(format!("Behaviour error: {}", e)))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
            .build();

        Ok(swarm)
    }

    async fn run_event_loop(
        mut swarm: Swarm<VerifierBehaviour>,
        mut command_rx: mpsc::Receiver<SwarmCommand>,
        announce_tx: mpsc::Sender<Announcement>,
        stats: Arc<RwLock<SwarmStats>>,
    ) {
        let start_time = Instant::now();
        let topic = IdentTopic::new(ANNOUNCEMENT_TOPIC);
        let mut stats_tick = tokio::time::interval(Duration::from_secs(10));

        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    Self::handle_swarm_event(event, &announce_tx, &stats);
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Publish { data, response }) => {
                            let len = data.len();
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .publish(topic.clone(), data)
                                .map(|_| ())
                                .map_err(|e| NetworkError::Publish(format!("{:?}", e)));
                            if result.is_ok() {
                                stats.write().announcements_published += 1;
                                debug!("Published {} bytes to {}", len, ANNOUNCEMENT_TOPIC);
                            }
                            let _ = response.send(result);
                        }
                        Some(SwarmCommand::Dial { addr }) => match swarm.dial(addr.clone()) {
                            Ok(_) => info!("Dialing {}", addr),
                            Err(e) => warn!("Failed to dial {}: {}", addr, e),
                        },
                        Some(SwarmCommand::Shutdown) | None => {
                            info!("Swarm shutdown requested");
                            break;
                        }
                    }
                }

                _ = stats_tick.tick() => {
                    let mut s = stats.write();
                    s.connected_peers = swarm.connected_peers().count();
                    s.uptime_secs = start_time.elapsed().as_secs();
                }
            }
        }

        info!("Swarm event loop terminated");
    }

    fn handle_swarm_event(
        event: SwarmEvent<VerifierBehaviourEvent>,
        announce_tx: &mpsc::Sender<Announcement>,
        stats: &Arc<RwLock<SwarmStats>>,
    ) {
        match event {
            SwarmEvent::Behaviour(VerifierBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                let source = message.source.unwrap_or(propagation_source);
                debug!(
                    "Announcement from {} via {}: {} bytes",
                    source,
                    propagation_source,
                    message.data.len()
                );
                stats.write().announcements_received += 1;
                let announcement = Announcement {
                    source,
                    data: message.data,
                };
                if announce_tx.try_send(announcement).is_err() {
                    warn!("Announcement queue full, dropping message from {}", source);
                }
            }

            SwarmEvent::Behaviour(VerifierBehaviourEvent::Gossipsub(
                gossipsub::Event::Subscribed { peer_id, topic },
            )) => {
                debug!("Peer {} subscribed to {}", peer_id, topic);
            }

            SwarmEvent::Behaviour(VerifierBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!(
                    "Identified peer {}: {} {:?}",
                    peer_id, info.protocol_version, info.listen_addrs
                );
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                info!(
                    "Connected to peer {} via {:?} (total: {})",
                    peer_id, endpoint, num_established
                );
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    info!("Disconnected from peer {}", peer_id);
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!("Outgoing connection to {:?} failed: {}", peer_id, error);
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
            }

            _ => {}
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn stats(&self) -> SwarmStats {
        self.stats.read().clone()
    }

    pub async fn dial(&self, addr: Multiaddr) -> crate::error::Result<()> {
        self.command_tx
            .send(SwarmCommand::Dial { addr })
            .await
            .map_err(|e| NetworkError::Channel(e.to_string()))
    }

    /// Stop the event loop and the inbound acceptor
    pub async fn stop(&mut self) {
        if self.command_tx.send(SwarmCommand::Shutdown).await.is_err() {
            debug!("Swarm event loop already stopped");
        }
        for task in self.tasks.drain(..) {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Swarm task failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SwarmConfig::default();
        assert!(config.listen_addrs.is_empty());
        assert_eq!(config.gossipsub.mesh_n, 6);
        assert_eq!(config.idle_connection_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_swarm_start_with_seed_is_deterministic() {
        let config = SwarmConfig {
            listen_addrs: vec!["/ip4/127.0.0.1/tcp/0".parse().unwrap()],
            identity_seed: Some([7u8; 32]),
            ..Default::default()
        };
        let (mut runtime, transport, _events) = SwarmRuntime::start(config.clone()).await.unwrap();
        let first = runtime.local_peer_id();
        assert_eq!(transport.local_peer_id(), first);
        runtime.stop().await;

        let (mut again, _, _) = SwarmRuntime::start(config).await.unwrap();
        assert_eq!(again.local_peer_id(), first);
        again.stop().await;
    }
}
