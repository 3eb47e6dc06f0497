//! State shared by every replication task

use parking_lot::RwLock;
use std::sync::Arc;
use verifier_core::{AcceptAll, SignatureVerifier};
use verifier_storage::SignatureLog;

use crate::config::SyncConfig;
use crate::signer_set::{AllowAll, SignerSet};
use crate::stats::SyncStats;

#[derive(Clone)]
pub struct SyncContext {
    pub log: Arc<SignatureLog>,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub signers: Arc<dyn SignerSet>,
    pub config: SyncConfig,
    pub stats: Arc<RwLock<SyncStats>>,
}

impl SyncContext {
    pub fn new(
        log: Arc<SignatureLog>,
        verifier: Arc<dyn SignatureVerifier>,
        signers: Arc<dyn SignerSet>,
        config: SyncConfig,
    ) -> Self {
        Self {
            log,
            verifier,
            signers,
            config,
            stats: Arc::new(RwLock::new(SyncStats::default())),
        }
    }

    /// No verification and every signer eligible
    pub fn permissive(log: Arc<SignatureLog>, config: SyncConfig) -> Self {
        Self::new(log, Arc::new(AcceptAll), Arc::new(AllowAll), config)
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("log", &self.log)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
