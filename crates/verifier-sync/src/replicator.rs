//! Replication service
//!
//! Wires a [`StreamTransport`] to the attestation log:
//!
//! ```text
//!   inbound streams ──► admission (per-peer throttle, concurrency) ──► responder
//!   announcements   ──► unknown tips ──► scheduler ──► outbound sessions
//!   publish ticker  ──► latest tips  ──► transport.publish
//! ```

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use verifier_core::Address;
use verifier_network::{Announcement, PeerId, RateLimiter, StreamTransport, TransportEvents};

use crate::announce::{decode_announcement, publish_latest, signers_to_sync};
use crate::context::SyncContext;
use crate::error::Result;
use crate::responder::handle_stream;
use crate::scheduler::SyncScheduler;
use crate::stats::SyncStats;

pub struct Replicator<T: StreamTransport> {
    ctx: Arc<SyncContext>,
    transport: Arc<T>,
    scheduler: Arc<SyncScheduler<T>>,
    inbound_permits: Arc<Semaphore>,
    inbound_throttle: RateLimiter<PeerId>,
    cancel: CancellationToken,
}

/// Running replicator tasks
pub struct ReplicatorHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReplicatorHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::warn!("Replicator task ended abnormally: {}", e);
            }
        }
    }
}

impl<T: StreamTransport> Replicator<T> {
    pub fn new(ctx: SyncContext, transport: T) -> Self {
        let ctx = Arc::new(ctx);
        let transport = Arc::new(transport);
        let cancel = CancellationToken::new();
        let inbound = &ctx.config.inbound;
        let inbound_permits = Arc::new(Semaphore::new(inbound.concurrency.max(1)));
        let inbound_throttle = RateLimiter::per_second(inbound.throttling);
        let scheduler = Arc::new(SyncScheduler::new(
            ctx.clone(),
            transport.clone(),
            cancel.child_token(),
        ));
        Self {
            ctx,
            transport,
            scheduler,
            inbound_permits,
            inbound_throttle,
            cancel,
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.transport.local_peer_id()
    }

    pub fn stats(&self) -> SyncStats {
        self.ctx.stats()
    }

    /// Start the accept, announcement and publish loops
    pub fn spawn(self: &Arc<Self>, events: TransportEvents<T::Stream>) -> ReplicatorHandle {
        let TransportEvents {
            streams,
            announcements,
        } = events;

        let mut tasks = vec![
            tokio::spawn(Arc::clone(self).accept_loop(streams)),
            tokio::spawn(Arc::clone(self).announcement_loop(announcements)),
        ];
        if self.ctx.config.publish_interval().is_some() {
            tasks.push(tokio::spawn(Arc::clone(self).publish_loop()));
        }

        tracing::info!("Replicator started as {}", self.local_peer_id());
        ReplicatorHandle {
            cancel: self.cancel.clone(),
            tasks,
        }
    }

    /// Publish the current tips now
    pub async fn publish_latest(&self) -> Result<usize> {
        publish_latest(&self.ctx, self.transport.as_ref()).await
    }

    /// Queue a session with `peer` for `signers`
    pub fn sync_with(&self, peer: PeerId, signers: impl IntoIterator<Item = Address>) {
        self.scheduler.schedule(peer, signers);
    }

    /// React to one message from the announcement topic
    pub fn handle_announcement(&self, announcement: Announcement) {
        if announcement.source == self.local_peer_id() {
            return;
        }
        let Some(latests) = decode_announcement(&announcement.data) else {
            return;
        };
        self.ctx.stats.write().announcements_received += 1;

        let signers = signers_to_sync(&self.ctx, &latests);
        if signers.is_empty() {
            return;
        }
        tracing::debug!(
            "{} announced {} unknown tips",
            announcement.source,
            signers.len()
        );
        self.sync_with(announcement.source, signers);
    }

    async fn accept_loop(self: Arc<Self>, mut streams: mpsc::Receiver<(PeerId, T::Stream)>) {
        loop {
            let (peer, io) = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = streams.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };
            self.ctx.stats.write().inbound_streams += 1;

            if !self.inbound_throttle.check(&peer) {
                tracing::warn!("Throttled stream from {}", peer);
                self.ctx.stats.write().inbound_rejected += 1;
                continue;
            }
            let permit = match self.inbound_permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!("Too many inbound streams, rejected {}", peer);
                    self.ctx.stats.write().inbound_rejected += 1;
                    continue;
                }
            };

            let ctx = self.ctx.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                let _permit = permit;
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = handle_stream(&ctx, peer, io) => {
                        if let Err(e) = result {
                            tracing::debug!("Stream from {} ended: {}", peer, e);
                        }
                    }
                }
            });
        }
        tracing::debug!("Accept loop stopped");
    }

    async fn announcement_loop(self: Arc<Self>, mut announcements: mpsc::Receiver<Announcement>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = announcements.recv() => match next {
                    Some(announcement) => self.handle_announcement(announcement),
                    None => break,
                },
            }
        }
        tracing::debug!("Announcement loop stopped");
    }

    async fn publish_loop(self: Arc<Self>) {
        let Some(period) = self.ctx.config.publish_interval() else {
            return;
        };
        let mut ticker = tokio::time::interval(period);
        let mut prune = 0u32;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_latest().await {
                        tracing::debug!("Publish failed: {}", e);
                    }
                    prune = prune.wrapping_add(1);
                    if prune % 60 == 0 {
                        self.inbound_throttle.prune();
                    }
                }
            }
        }
        tracing::debug!("Publish loop stopped");
    }
}
