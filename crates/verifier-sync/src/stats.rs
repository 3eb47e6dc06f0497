//! Replication counters

use serde::{Deserialize, Serialize};

/// Running totals since start; shared behind `Arc<RwLock<_>>`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub find_requests_sent: u64,
    pub find_requests_served: u64,
    pub pages_sent: u64,
    pub pages_received: u64,
    pub records_applied: u64,
    pub records_known: u64,
    pub records_overtaken: u64,
    pub records_rejected: u64,
    pub announcements_published: u64,
    pub announcements_received: u64,
    pub inbound_streams: u64,
    pub inbound_rejected: u64,
}

/// What applying one batch of remote records did to the log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Saved as new records or tuple overwrites
    pub applied: usize,
    /// Already present under the same id
    pub known: usize,
    /// Refused because their previous id did not match the local tip
    pub overtaken: usize,
    /// Failed verification or storage
    pub rejected: usize,
}

impl ApplyOutcome {
    pub fn merge(&mut self, other: ApplyOutcome) {
        self.applied += other.applied;
        self.known += other.known;
        self.overtaken += other.overtaken;
        self.rejected += other.rejected;
    }

    pub fn total(&self) -> usize {
        self.applied + self.known + self.overtaken + self.rejected
    }

    pub(crate) fn record(&self, stats: &mut SyncStats) {
        stats.records_applied += self.applied as u64;
        stats.records_known += self.known as u64;
        stats.records_overtaken += self.overtaken as u64;
        stats.records_rejected += self.rejected as u64;
    }
}
