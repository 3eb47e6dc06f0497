//! Stream admission throttling
//!
//! Token bucket per key: `rate` admissions per `window`, refilled in full
//! once the window has elapsed. A rate of zero disables throttling.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Token bucket rate limiter
pub struct RateLimiter<K: Hash + Eq> {
    /// Admissions per window
    rate: u32,

    /// Window duration
    window: Duration,

    /// Per-key buckets
    buckets: DashMap<K, TokenBucket>,
}

struct TokenBucket {
    tokens: AtomicU64,
    last_refill: parking_lot::Mutex<Instant>,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(rate: u32, window: Duration) -> Self {
        Self {
            rate,
            window,
            buckets: DashMap::new(),
        }
    }

    /// `rate` admissions per second
    pub fn per_second(rate: u32) -> Self {
        Self::new(rate, Duration::from_secs(1))
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate == 0
    }

    /// Take a token if one is available
    pub fn check(&self, key: &K) -> bool {
        if self.is_unlimited() {
            return true;
        }
        let rate = self.rate as u64;
        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| TokenBucket {
                tokens: AtomicU64::new(rate),
                last_refill: parking_lot::Mutex::new(Instant::now()),
            });

        {
            let mut last_refill = bucket.last_refill.lock();
            if last_refill.elapsed() >= self.window {
                bucket.tokens.store(rate, Ordering::SeqCst);
                *last_refill = Instant::now();
            }
        }

        loop {
            let current = bucket.tokens.load(Ordering::SeqCst);
            if current == 0 {
                return false;
            }
            if bucket
                .tokens
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Wait until a token is available
    pub async fn acquire(&self, key: &K) {
        let backoff = (self.window / 10).max(Duration::from_millis(1));
        while !self.check(key) {
            tokio::time::sleep(backoff).await;
        }
    }

    pub fn remaining(&self, key: &K) -> u64 {
        self.buckets
            .get(key)
            .map(|b| b.tokens.load(Ordering::SeqCst))
            .unwrap_or(self.rate as u64)
    }

    /// Forget keys whose window has long passed
    pub fn prune(&self) {
        let stale = self.window * 10;
        self.buckets.retain(|_, b| b.last_refill.lock().elapsed() < stale);
    }
}
