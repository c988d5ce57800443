// src/domain/stats.rs

//! Transport traffic counters.
//!
//! One `TransportStats` is shared (via `Arc`) by every transporter in the
//! process. Counters only ever grow; nothing in this crate resets them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide byte and packet counters.
#[derive(Debug, Default)]
pub struct TransportStats {
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_received: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub bytes_received: u64,
    pub packets_received: u64,
}

impl TransportStats {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outbound packet of `bytes` encoded length.
    pub fn inc_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one inbound packet of `bytes` length.
    pub fn inc_received(&self, bytes: usize) {
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // ---
        StatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
        }
    }
}
