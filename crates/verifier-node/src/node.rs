//! Optimism verifier node
//!
//! Owns the attestation log and the node keys, and runs the libp2p swarm
//! with the replicator on top until a shutdown signal arrives.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use verifier_core::{AcceptAll, Ed25519Verifier, LocalSigner, SignatureVerifier};
use verifier_network::SwarmRuntime;
use verifier_storage::{RocksBackend, SignatureLog};
use verifier_sync::{
    run_stake_refresh, AllowAll, Replicator, SignerSet, StakeCache, StaticStakeSource,
    SyncContext,
};

use crate::attestor::Attestor;
use crate::config::{NodeConfig, StorageBackend};
use crate::keys;

/// Node state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Open the attestation log selected by `config`
pub fn open_log(config: &NodeConfig) -> anyhow::Result<SignatureLog> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(SignatureLog::in_memory()),
        StorageBackend::Rocksdb => {
            let path = config
                .storage
                .path
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| config.data_dir().join("db"));
            std::fs::create_dir_all(&path)?;
            let log = SignatureLog::open(RocksBackend::open(&path)?)?;
            tracing::info!("Opened attestation log at {:?} ({} records)", path, log.len());
            Ok(log)
        }
    }
}

pub struct VerifierNode {
    config: NodeConfig,
    data_dir: PathBuf,
    state: Arc<RwLock<NodeState>>,
    log: Arc<SignatureLog>,
    signer: Arc<LocalSigner>,
    stake: Arc<StakeCache>,
}

impl VerifierNode {
    /// Open storage and load (or create) the node keys
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let log = Arc::new(open_log(&config)?);
        let signer = Arc::new(keys::load_signer(&data_dir)?);
        let stake = Arc::new(StakeCache::new(config.signers.min_stake));
        stake.replace(config.signers.stakeholders()?);

        Ok(Self {
            config,
            data_dir,
            state: Arc::new(RwLock::new(NodeState::Starting)),
            log,
            signer,
            stake,
        })
    }

    pub fn state(&self) -> NodeState {
        self.state.read().clone()
    }

    pub fn log(&self) -> &Arc<SignatureLog> {
        &self.log
    }

    pub fn signer(&self) -> &LocalSigner {
        &self.signer
    }

    pub fn attestor(&self) -> Attestor {
        Attestor::new(
            self.log.clone(),
            self.signer.clone(),
            self.config.node.chain_id,
        )
    }

    /// Replication context; an empty stake table admits every signer
    pub fn sync_context(&self) -> SyncContext {
        let open = self.stake.is_empty();
        let signers: Arc<dyn SignerSet> = if open {
            Arc::new(AllowAll)
        } else {
            self.stake.clone()
        };
        let verifier: Arc<dyn SignatureVerifier> = if self.config.signers.verify && !open {
            Arc::new(Ed25519Verifier::new(
                self.config.node.chain_id,
                self.stake.clone(),
            ))
        } else {
            if self.config.signers.verify {
                tracing::warn!("No stakeholders configured; received signatures are not verified");
            }
            Arc::new(AcceptAll)
        };
        SyncContext::new(self.log.clone(), verifier, signers, self.config.sync.clone())
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(&mut self) -> anyhow::Result<()> {
        tracing::info!("Starting optimism verifier node...");
        *self.state.write() = NodeState::Starting;

        let identity_seed = keys::load_identity_seed(&self.data_dir)?;
        let swarm_config = self.config.swarm_config(identity_seed)?;
        let (mut swarm, transport, events) = SwarmRuntime::start(swarm_config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start swarm: {}", e))?;

        let cancel = CancellationToken::new();
        let refresh = if self.stake.is_empty() {
            None
        } else {
            let source = Arc::new(StaticStakeSource::new(self.config.signers.stakeholders()?));
            Some(tokio::spawn(run_stake_refresh(
                self.stake.clone(),
                source,
                Duration::from_secs(self.config.signers.refresh_interval_secs.max(1)),
                cancel.child_token(),
            )))
        };

        let replicator = Arc::new(Replicator::new(self.sync_context(), transport));
        let handle = replicator.spawn(events);

        *self.state.write() = NodeState::Running;
        self.print_startup_banner(&swarm);

        self.wait_for_shutdown().await;

        *self.state.write() = NodeState::Stopping;
        tracing::info!("Shutting down...");

        cancel.cancel();
        handle.shutdown().await;
        swarm.stop().await;
        if let Some(task) = refresh {
            let _ = task.await;
        }

        let stats = replicator.stats();
        tracing::info!(
            "Sync totals: {} sessions, {} records applied, {} overtaken, {} rejected",
            stats.sessions_completed,
            stats.records_applied,
            stats.records_overtaken,
            stats.records_rejected
        );

        *self.state.write() = NodeState::Stopped;
        tracing::info!("Node stopped");
        Ok(())
    }

    fn print_startup_banner(&self, swarm: &SwarmRuntime) {
        tracing::info!("Optimism verifier node is running");
        tracing::info!("Name: {}", self.config.node.name);
        tracing::info!("Chain ID: {}", self.config.node.chain_id);
        tracing::info!("Signer: {}", self.signer.address());
        tracing::info!("Peer ID: {}", swarm.local_peer_id());
        tracing::info!("P2P Listen: {}", self.config.p2p.listens.join(", "));
        tracing::info!("Bootnodes: {}", self.config.p2p.bootnodes.len());
        tracing::info!("Records: {}", self.log.len());
        tracing::info!("Stakeholders: {}", self.stake.len());
        tracing::info!("Press Ctrl+C to stop the node");
    }

    async fn wait_for_shutdown(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}
