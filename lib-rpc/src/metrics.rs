//! Lightweight counters the node façade surfaces when `enable_metrics`
//! is set, and a per-peer reputation score derived from call outcomes.
//! Neither backs a specific metrics exporter — that choice is left to
//! whoever consumes [`RpcMetrics::snapshot`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use lib_identity::Id;

/// A point-in-time read of the counters below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub timeouts: u64,
    pub throttled: u64,
    pub banned: u64,
}

/// Counters updated by the transport as it sends, receives, times out,
/// throttles, and bans. Cheap enough to maintain unconditionally; the
/// node façade decides whether to expose them.
#[derive(Default)]
pub struct RpcMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    timeouts: AtomicU64,
    throttled: AtomicU64,
    banned: AtomicU64,
}

impl RpcMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_banned(&self) {
        self.banned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            banned: self.banned.load(Ordering::Relaxed),
        }
    }
}

/// Per-peer reputation: a call completing successfully nudges a peer's
/// score up, a timeout or error nudges it down. Read-only to callers —
/// the (out-of-scope) lookup driver would use this to prefer peers, but
/// nothing here decides routing on its own.
#[derive(Default)]
pub struct ReputationTracker {
    scores: Mutex<HashMap<Id, i64>>,
}

impl ReputationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, id: Id) {
        *self.scores.lock().entry(id).or_insert(0) += 1;
    }

    pub fn record_failure(&self, id: Id) {
        *self.scores.lock().entry(id).or_insert(0) -= 1;
    }

    pub fn get(&self, id: &Id) -> i64 {
        self.scores.lock().get(id).copied().unwrap_or(0)
    }
}
