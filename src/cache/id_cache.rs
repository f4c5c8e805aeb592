//! RREQ identifier cache.

use super::CacheStats;
use super::expiring::ExpiringSet;
use std::net::Ipv4Addr;

/// Remembers which (originator, request id) pairs were already handled.
#[derive(Clone, Debug)]
pub struct IdCache {
    seen: ExpiringSet<(Ipv4Addr, u32)>,
}

impl IdCache {
    /// Create a cache whose entries live for `lifetime_ms`.
    pub fn new(lifetime_ms: u64) -> Self {
        Self {
            seen: ExpiringSet::new(lifetime_ms),
        }
    }

    /// Check whether the request was seen; if not, remember it.
    pub fn is_duplicate(&mut self, origin: Ipv4Addr, id: u32, now_ms: u64) -> bool {
        self.seen.check_and_insert((origin, id), now_ms)
    }

    /// Check without recording.
    pub fn contains(&self, origin: Ipv4Addr, id: u32, now_ms: u64) -> bool {
        self.seen.contains(&(origin, id), now_ms)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge(&mut self, now_ms: u64) -> usize {
        self.seen.purge(now_ms)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.len() == 0
    }

    pub fn lifetime_ms(&self) -> u64 {
        self.seen.lifetime_ms()
    }

    pub fn stats(&self, now_ms: u64) -> CacheStats {
        self.seen.stats(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_second_sighting_is_duplicate() {
        let mut cache = IdCache::new(1000);
        assert!(!cache.is_duplicate(addr(1), 7, 0));
        assert!(cache.is_duplicate(addr(1), 7, 10));
        assert!(!cache.is_duplicate(addr(1), 8, 10));
        assert!(!cache.is_duplicate(addr(2), 7, 10));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_expired_entry_is_not_duplicate() {
        let mut cache = IdCache::new(1000);
        assert!(!cache.is_duplicate(addr(1), 7, 0));
        assert!(cache.contains(addr(1), 7, 999));
        assert!(!cache.contains(addr(1), 7, 1000));
        // Re-recorded with a fresh lifetime
        assert!(!cache.is_duplicate(addr(1), 7, 1000));
        assert!(cache.is_duplicate(addr(1), 7, 1999));
    }

    #[test]
    fn test_purge() {
        let mut cache = IdCache::new(1000);
        cache.is_duplicate(addr(1), 1, 0);
        cache.is_duplicate(addr(1), 2, 500);
        let stats = cache.stats(1200);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.expired, 1);

        assert_eq!(cache.purge(1200), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.purge(2000), 1);
        assert!(cache.is_empty());
    }
}
