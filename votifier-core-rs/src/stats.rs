//! Receiver counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Connection counters shared by the accept loop and its handlers
#[derive(Debug, Default)]
pub struct ReceiverStats {
    accepted: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    /// Votes decoded and handed to listeners
    pub delivered: u64,
    /// Connections that ended without a vote
    pub rejected: u64,
}

impl ReceiverStats {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
