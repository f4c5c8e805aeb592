//! One-hop neighbor liveness and blacklist.
//!
//! A neighbor is live until its expiry; every control packet or hello
//! from it pushes the expiry forward. Neighbors that failed to
//! acknowledge an RREP are blacklisted: their RREQs are ignored until the
//! blacklist entry runs out.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// A one-hop neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub addr: Ipv4Addr,
    /// Absolute expiry (ms).
    pub expires_at_ms: u64,
}

/// Neighbor table.
#[derive(Clone, Debug, Default)]
pub struct Neighbors {
    neighbors: BTreeMap<Ipv4Addr, Neighbor>,
    /// Address -> end of blacklisting (ms).
    blacklist: BTreeMap<Ipv4Addr, u64>,
}

impl Neighbors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `addr` is alive for at least `lifetime_ms` more.
    ///
    /// Expiry only moves forward.
    pub fn touch(&mut self, addr: Ipv4Addr, lifetime_ms: u64, now_ms: u64) {
        let expires_at_ms = now_ms.saturating_add(lifetime_ms);
        self.neighbors
            .entry(addr)
            .and_modify(|n| n.expires_at_ms = n.expires_at_ms.max(expires_at_ms))
            .or_insert(Neighbor {
                addr,
                expires_at_ms,
            });
    }

    /// A neighbor is one whose expiry lies ahead and that is not
    /// blacklisted.
    pub fn is_neighbor(&self, addr: &Ipv4Addr, now_ms: u64) -> bool {
        !self.is_blacklisted(addr, now_ms)
            && self
                .neighbors
                .get(addr)
                .is_some_and(|n| now_ms < n.expires_at_ms)
    }

    /// Expiry of a neighbor, if known.
    pub fn expire_time(&self, addr: &Ipv4Addr) -> Option<u64> {
        self.neighbors.get(addr).map(|n| n.expires_at_ms)
    }

    pub fn remove(&mut self, addr: &Ipv4Addr) -> Option<Neighbor> {
        self.neighbors.remove(addr)
    }

    /// Ignore `addr` for `duration_ms`.
    pub fn blacklist(&mut self, addr: Ipv4Addr, duration_ms: u64, now_ms: u64) {
        self.blacklist.insert(addr, now_ms.saturating_add(duration_ms));
    }

    pub fn is_blacklisted(&self, addr: &Ipv4Addr, now_ms: u64) -> bool {
        self.blacklist.get(addr).is_some_and(|&until| now_ms < until)
    }

    /// Remove expired neighbors and blacklist entries.
    ///
    /// Returns the neighbors whose link is now considered broken.
    pub fn purge(&mut self, now_ms: u64) -> Vec<Ipv4Addr> {
        let expired: Vec<Ipv4Addr> = self
            .neighbors
            .values()
            .filter(|n| now_ms >= n.expires_at_ms)
            .map(|n| n.addr)
            .collect();
        for addr in &expired {
            self.neighbors.remove(addr);
        }
        self.blacklist.retain(|_, &mut until| now_ms < until);
        expired
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn clear(&mut self) {
        self.neighbors.clear();
        self.blacklist.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_touch_only_extends() {
        let mut neighbors = Neighbors::new();
        neighbors.touch(addr(2), 2000, 0);
        neighbors.touch(addr(2), 500, 100);
        assert_eq!(neighbors.expire_time(&addr(2)), Some(2000));
        neighbors.touch(addr(2), 2000, 1000);
        assert_eq!(neighbors.expire_time(&addr(2)), Some(3000));
    }

    #[test]
    fn test_is_neighbor_until_expiry() {
        let mut neighbors = Neighbors::new();
        neighbors.touch(addr(2), 1000, 0);
        assert!(neighbors.is_neighbor(&addr(2), 999));
        assert!(!neighbors.is_neighbor(&addr(2), 1000));
        assert!(!neighbors.is_neighbor(&addr(3), 0));
    }

    #[test]
    fn test_purge_reports_expired() {
        let mut neighbors = Neighbors::new();
        neighbors.touch(addr(2), 1000, 0);
        neighbors.touch(addr(3), 5000, 0);

        assert!(neighbors.purge(500).is_empty());
        assert_eq!(neighbors.purge(1000), vec![addr(2)]);
        assert_eq!(neighbors.len(), 1);
        assert!(neighbors.is_neighbor(&addr(3), 1000));
    }

    #[test]
    fn test_blacklist_expires() {
        let mut neighbors = Neighbors::new();
        neighbors.blacklist(addr(4), 300, 100);
        assert!(neighbors.is_blacklisted(&addr(4), 399));
        assert!(!neighbors.is_blacklisted(&addr(4), 400));

        neighbors.purge(400);
        assert!(!neighbors.is_blacklisted(&addr(4), 0));
    }

    #[test]
    fn test_blacklisted_neighbor_is_not_a_neighbor() {
        let mut neighbors = Neighbors::new();
        neighbors.touch(addr(5), 10_000, 0);
        neighbors.blacklist(addr(5), 5000, 0);

        assert!(neighbors.is_blacklisted(&addr(5), 100));
        assert!(!neighbors.is_neighbor(&addr(5), 100));
        // Liveness is back once the blacklisting runs out
        assert!(neighbors.is_neighbor(&addr(5), 5000));
    }
}
