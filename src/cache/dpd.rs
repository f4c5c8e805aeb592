//! Duplicate packet detection for broadcast data.

use super::CacheStats;
use super::expiring::ExpiringSet;
use std::net::Ipv4Addr;

/// Remembers (source, packet id) pairs of forwarded broadcasts.
#[derive(Clone, Debug)]
pub struct DuplicatePacketDetection {
    seen: ExpiringSet<(Ipv4Addr, u64)>,
}

impl DuplicatePacketDetection {
    pub fn new(lifetime_ms: u64) -> Self {
        Self {
            seen: ExpiringSet::new(lifetime_ms),
        }
    }

    /// Check whether the packet was seen; if not, remember it.
    pub fn is_duplicate(&mut self, source: Ipv4Addr, packet_id: u64, now_ms: u64) -> bool {
        self.seen.check_and_insert((source, packet_id), now_ms)
    }

    pub fn purge(&mut self, now_ms: u64) -> usize {
        self.seen.purge(now_ms)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.len() == 0
    }

    pub fn stats(&self, now_ms: u64) -> CacheStats {
        self.seen.stats(now_ms)
    }
}
