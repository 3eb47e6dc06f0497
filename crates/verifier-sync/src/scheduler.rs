//! Outbound session scheduling
//!
//! Requests to sync with a peer are coalesced: while a worker for that peer
//! is waiting or running, newly requested signers join its pending set and
//! are picked up by its next session instead of spawning another worker.
//! Workers share a global concurrency limit and start-rate throttle.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use verifier_core::Address;
use verifier_network::{PeerId, RateLimiter, StreamTransport};

use crate::context::SyncContext;
use crate::session::sync_with_peer;

pub struct SyncScheduler<T: StreamTransport> {
    ctx: Arc<SyncContext>,
    transport: Arc<T>,
    /// Peers with a live worker, and the signers its next session covers
    pending: DashMap<PeerId, BTreeSet<Address>>,
    permits: Arc<Semaphore>,
    throttle: RateLimiter<()>,
    cancel: CancellationToken,
}

impl<T: StreamTransport> SyncScheduler<T> {
    pub fn new(ctx: Arc<SyncContext>, transport: Arc<T>, cancel: CancellationToken) -> Self {
        let outbound = &ctx.config.outbound;
        let permits = Arc::new(Semaphore::new(outbound.concurrency.max(1)));
        let throttle = RateLimiter::per_second(outbound.throttling);
        Self {
            ctx,
            transport,
            pending: DashMap::new(),
            permits,
            throttle,
            cancel,
        }
    }

    /// Queue a session with `peer` covering `signers`
    pub fn schedule(self: &Arc<Self>, peer: PeerId, signers: impl IntoIterator<Item = Address>) {
        if self.cancel.is_cancelled() {
            return;
        }
        match self.pending.entry(peer) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().extend(signers);
                tracing::trace!("Coalesced sync request for {}", peer);
            }
            Entry::Vacant(entry) => {
                entry.insert(signers.into_iter().collect());
                let this = Arc::clone(self);
                tokio::spawn(async move { this.run_worker(peer).await });
            }
        }
    }

    /// Peers with a waiting or running worker
    pub fn active_peers(&self) -> usize {
        self.pending.len()
    }

    async fn run_worker(self: Arc<Self>, peer: PeerId) {
        loop {
            let permit = tokio::select! {
                _ = self.cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.throttle.acquire(&()) => {}
            }

            let signers: Vec<Address> = match self.pending.get_mut(&peer) {
                Some(mut set) => std::mem::take(&mut *set).into_iter().collect(),
                None => break,
            };

            if !signers.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    result = sync_with_peer(&self.ctx, self.transport.as_ref(), peer, &signers) => {
                        match result {
                            Ok(outcome) => tracing::info!(
                                "Synced {} signers with {}: {} applied, {} known, {} overtaken, {} rejected",
                                signers.len(),
                                peer,
                                outcome.applied,
                                outcome.known,
                                outcome.overtaken,
                                outcome.rejected
                            ),
                            Err(e) => tracing::warn!("Sync with {} failed: {}", peer, e),
                        }
                    }
                }
            }
            drop(permit);

            // retire unless more signers arrived during the session
            if self.pending.remove_if(&peer, |_, set| set.is_empty()).is_some() {
                return;
            }
        }
        self.pending.remove(&peer);
    }
}
