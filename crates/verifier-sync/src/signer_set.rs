//! Eligible signers and their stake
//!
//! Announcements only advertise and only act on signers the node considers
//! eligible. [`StakeCache`] keeps the stakeholder table in memory, refreshed
//! periodically from a [`StakeSource`], and doubles as the key resolver for
//! signature verification.

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use verifier_core::{Address, KeyResolver};

use crate::error::Result;

/// Decides which signers take part in replication
pub trait SignerSet: Send + Sync {
    fn is_eligible(&self, signer: &Address) -> bool;

    /// Stake backing `signer`; zero when unknown
    fn stake(&self, signer: &Address) -> u64;
}

impl<T: SignerSet + ?Sized> SignerSet for Arc<T> {
    fn is_eligible(&self, signer: &Address) -> bool {
        (**self).is_eligible(signer)
    }

    fn stake(&self, signer: &Address) -> u64 {
        (**self).stake(signer)
    }
}

/// Every signer is eligible
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl SignerSet for AllowAll {
    fn is_eligible(&self, _signer: &Address) -> bool {
        true
    }

    fn stake(&self, _signer: &Address) -> u64 {
        0
    }
}

/// One row of the stake table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stakeholder {
    pub address: Address,
    pub public_key: VerifyingKey,
    pub stake: u64,
    /// Registered as a signing candidate
    pub candidate: bool,
}

impl Stakeholder {
    pub fn new(public_key: VerifyingKey, stake: u64, candidate: bool) -> Self {
        Self {
            address: Address::from_public_key(public_key.as_bytes()),
            public_key,
            stake,
            candidate,
        }
    }
}

/// Where the stake table comes from
#[async_trait]
pub trait StakeSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Stakeholder>>;
}

/// A fixed table, typically from the node config
#[derive(Clone, Debug, Default)]
pub struct StaticStakeSource {
    stakeholders: Vec<Stakeholder>,
}

impl StaticStakeSource {
    pub fn new(stakeholders: Vec<Stakeholder>) -> Self {
        Self { stakeholders }
    }
}

#[async_trait]
impl StakeSource for StaticStakeSource {
    async fn fetch(&self) -> Result<Vec<Stakeholder>> {
        Ok(self.stakeholders.clone())
    }
}

/// In-memory stake table
pub struct StakeCache {
    entries: RwLock<HashMap<Address, Stakeholder>>,
    min_stake: u64,
    refreshed_at: RwLock<Option<Instant>>,
}

impl StakeCache {
    pub fn new(min_stake: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            min_stake,
            refreshed_at: RwLock::new(None),
        }
    }

    /// Replace the table wholesale
    pub fn replace(&self, stakeholders: Vec<Stakeholder>) {
        let table = stakeholders
            .into_iter()
            .map(|s| (s.address, s))
            .collect::<HashMap<_, _>>();
        *self.entries.write() = table;
        *self.refreshed_at.write() = Some(Instant::now());
    }

    /// Pull a fresh table from `source`; the old table is kept on failure
    pub async fn refresh(&self, source: &dyn StakeSource) -> Result<usize> {
        let stakeholders = source.fetch().await?;
        let count = stakeholders.len();
        self.replace(stakeholders);
        tracing::debug!("Stake table refreshed: {} stakeholders", count);
        Ok(count)
    }

    pub fn get(&self, address: &Address) -> Option<Stakeholder> {
        self.entries.read().get(address).cloned()
    }

    /// Sum of stake over eligible candidates
    pub fn total_stake(&self) -> u64 {
        self.entries
            .read()
            .values()
            .filter(|s| self.qualifies(s))
            .fold(0u64, |acc, s| acc.saturating_add(s.stake))
    }

    /// Eligible candidates, highest stake first
    pub fn candidates(&self) -> Vec<Stakeholder> {
        let mut out: Vec<Stakeholder> = self
            .entries
            .read()
            .values()
            .filter(|s| self.qualifies(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.stake.cmp(&a.stake).then(a.address.cmp(&b.address)));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        *self.refreshed_at.read()
    }

    fn qualifies(&self, stakeholder: &Stakeholder) -> bool {
        stakeholder.candidate && stakeholder.stake >= self.min_stake
    }
}

impl SignerSet for StakeCache {
    fn is_eligible(&self, signer: &Address) -> bool {
        self.entries
            .read()
            .get(signer)
            .map(|s| self.qualifies(s))
            .unwrap_or(false)
    }

    fn stake(&self, signer: &Address) -> u64 {
        self.entries.read().get(signer).map(|s| s.stake).unwrap_or(0)
    }
}

impl KeyResolver for StakeCache {
    fn resolve(&self, signer: &Address) -> Option<VerifyingKey> {
        self.entries.read().get(signer).map(|s| s.public_key)
    }
}

/// Refresh `cache` from `source` every `interval` until cancelled
pub async fn run_stake_refresh(
    cache: Arc<StakeCache>,
    source: Arc<dyn StakeSource>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = cache.refresh(source.as_ref()).await {
                    tracing::warn!("Stake refresh failed: {}", e);
                }
            }
        }
    }
}
