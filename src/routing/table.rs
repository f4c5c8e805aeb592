//! Destination-indexed routing table.

use super::entry::{RouteEntry, RouteState};
use crate::transport::InterfaceId;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// What a purge pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    /// Usable routes whose lifetime ran out and were marked invalid.
    pub invalidated: Vec<Ipv4Addr>,
    /// Invalid routes that were removed.
    pub removed: Vec<Ipv4Addr>,
}

/// The routing table, keyed by destination address.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    routes: BTreeMap<Ipv4Addr, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a route in any state.
    pub fn lookup(&self, dst: &Ipv4Addr) -> Option<&RouteEntry> {
        self.routes.get(dst)
    }

    pub fn lookup_mut(&mut self, dst: &Ipv4Addr) -> Option<&mut RouteEntry> {
        self.routes.get_mut(dst)
    }

    /// Look up a route that can carry packets right now.
    pub fn lookup_valid(&self, dst: &Ipv4Addr) -> Option<&RouteEntry> {
        self.routes.get(dst).filter(|e| e.is_usable())
    }

    pub fn contains(&self, dst: &Ipv4Addr) -> bool {
        self.routes.contains_key(dst)
    }

    /// Insert or replace the route for the entry's destination.
    ///
    /// Returns the previous entry if one was replaced.
    pub fn upsert(&mut self, entry: RouteEntry) -> Option<RouteEntry> {
        self.routes.insert(entry.destination(), entry)
    }

    /// Change the state of an existing route. Returns false if unknown.
    pub fn set_entry_state(&mut self, dst: &Ipv4Addr, state: RouteState) -> bool {
        match self.routes.get_mut(dst) {
            Some(entry) => {
                entry.set_state(state);
                true
            }
            None => false,
        }
    }

    /// Invalidate one route. Returns false if unknown.
    pub fn invalidate(&mut self, dst: &Ipv4Addr, delete_period_ms: u64, now_ms: u64) -> bool {
        match self.routes.get_mut(dst) {
            Some(entry) => {
                entry.invalidate(delete_period_ms, now_ms);
                true
            }
            None => false,
        }
    }

    /// Extend a usable route's lifetime if `now + lifetime` is later than
    /// the current expiry. Returns whether the destination exists.
    ///
    /// Invalid and searching routes keep their deadlines.
    pub fn update_lifetime_if_greater(
        &mut self,
        dst: &Ipv4Addr,
        lifetime_ms: u64,
        now_ms: u64,
    ) -> bool {
        match self.routes.get_mut(dst) {
            Some(entry) => {
                if entry.is_usable() {
                    entry.reset_rreq_count();
                    entry.extend_lifetime(lifetime_ms, now_ms);
                }
                true
            }
            None => false,
        }
    }

    /// Record `precursor` on the route to `dst`. Returns false if unknown.
    pub fn add_precursor(&mut self, dst: &Ipv4Addr, precursor: Ipv4Addr) -> bool {
        match self.routes.get_mut(dst) {
            Some(entry) => {
                entry.insert_precursor(precursor);
                true
            }
            None => false,
        }
    }

    /// Precursors of the route to `dst` (empty if unknown).
    pub fn precursors(&self, dst: &Ipv4Addr) -> Vec<Ipv4Addr> {
        self.routes
            .get(dst)
            .map(|e| e.precursors().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn delete_route(&mut self, dst: &Ipv4Addr) -> Option<RouteEntry> {
        self.routes.remove(dst)
    }

    /// Usable routes whose next hop is `next_hop`, with their seqnos.
    pub fn destinations_via(&self, next_hop: &Ipv4Addr) -> BTreeMap<Ipv4Addr, u32> {
        self.routes
            .values()
            .filter(|e| e.is_usable() && e.next_hop() == *next_hop)
            .map(|e| (e.destination(), e.seqno()))
            .collect()
    }

    /// Invalidate every listed destination.
    pub fn invalidate_all<'a>(
        &mut self,
        destinations: impl IntoIterator<Item = &'a Ipv4Addr>,
        delete_period_ms: u64,
        now_ms: u64,
    ) {
        for dst in destinations {
            self.invalidate(dst, delete_period_ms, now_ms);
        }
    }

    /// Remove every route using `interface`. Returns the removed destinations.
    pub fn delete_routes_with_interface(&mut self, interface: InterfaceId) -> Vec<Ipv4Addr> {
        let doomed: Vec<Ipv4Addr> = self
            .routes
            .values()
            .filter(|e| e.interface() == interface)
            .map(|e| e.destination())
            .collect();
        for dst in &doomed {
            self.routes.remove(dst);
        }
        doomed
    }

    /// Drop precursors for which `keep` returns false.
    pub fn prune_precursors(&mut self, mut keep: impl FnMut(&Ipv4Addr) -> bool) {
        for entry in self.routes.values_mut() {
            let gone: Vec<Ipv4Addr> = entry
                .precursors()
                .iter()
                .filter(|p| !keep(p))
                .copied()
                .collect();
            for p in gone {
                entry.remove_precursor(&p);
            }
        }
    }

    /// Expire routes.
    ///
    /// Expired usable routes are invalidated for `delete_period_ms`. Expired
    /// invalid routes are removed once they have no precursors; any left
    /// over are cleared so the route goes on the next pass. Searches are
    /// owned by the discovery timer and left alone.
    pub fn purge(&mut self, delete_period_ms: u64, now_ms: u64) -> PurgeOutcome {
        let mut outcome = PurgeOutcome::default();

        for entry in self.routes.values_mut() {
            if !entry.is_expired(now_ms) {
                continue;
            }
            match entry.state() {
                RouteState::Valid | RouteState::ValidNoData => {
                    entry.invalidate(delete_period_ms, now_ms);
                    outcome.invalidated.push(entry.destination());
                }
                RouteState::Invalid => {
                    if entry.has_precursors() {
                        entry.clear_precursors();
                    } else {
                        outcome.removed.push(entry.destination());
                    }
                }
                RouteState::InSearch => {}
            }
        }

        for dst in &outcome.removed {
            self.routes.remove(dst);
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    /// Render the table with lifetimes relative to `now_ms`.
    pub fn dump(&self, now_ms: u64) -> RoutingTableDump<'_> {
        RoutingTableDump { table: self, now_ms }
    }
}

/// Display adapter printing one line per route.
pub struct RoutingTableDump<'a> {
    table: &'a RoutingTable,
    now_ms: u64,
}

impl fmt::Display for RoutingTableDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<16}{:<16}{:<8}{:<6}{:<12}{}",
            "Destination", "Gateway", "Iface", "Hops", "State", "Expire"
        )?;
        for e in self.table.iter() {
            writeln!(
                f,
                "{:<16}{:<16}{:<8}{:<6}{:<12}{:.2}s",
                e.destination().to_string(),
                e.next_hop().to_string(),
                e.interface().to_string(),
                e.hop_count(),
                e.state().to_string(),
                e.lifetime_ms(self.now_ms) as f64 / 1000.0,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    fn route(dst: u8, next_hop: u8, seqno: u32, lifetime_ms: u64) -> RouteEntry {
        RouteEntry::new(addr(dst), true, seqno, InterfaceId(0), 1, addr(next_hop), lifetime_ms, 0)
    }

    #[test]
    fn test_lookup_valid_skips_unusable() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));
        table.upsert(RouteEntry::in_search(addr(6), InterfaceId(0), 1, 1000, 0));

        assert!(table.lookup_valid(&addr(5)).is_some());
        assert!(table.lookup(&addr(6)).is_some());
        assert!(table.lookup_valid(&addr(6)).is_none());

        table.invalidate(&addr(5), 500, 0);
        assert!(table.lookup_valid(&addr(5)).is_none());
    }

    #[test]
    fn test_update_lifetime_if_greater() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));

        assert!(table.update_lifetime_if_greater(&addr(5), 200, 500));
        assert_eq!(table.lookup(&addr(5)).unwrap().expires_at_ms(), 1000);
        assert!(table.update_lifetime_if_greater(&addr(5), 3000, 500));
        assert_eq!(table.lookup(&addr(5)).unwrap().expires_at_ms(), 3500);
        assert!(!table.update_lifetime_if_greater(&addr(9), 3000, 500));
    }

    #[test]
    fn test_precursors() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));
        assert!(table.add_precursor(&addr(5), addr(3)));
        assert!(table.add_precursor(&addr(5), addr(4)));
        assert!(!table.add_precursor(&addr(9), addr(4)));
        assert_eq!(table.precursors(&addr(5)), vec![addr(3), addr(4)]);
        assert!(table.precursors(&addr(9)).is_empty());

        table.prune_precursors(|p| *p == addr(4));
        assert_eq!(table.precursors(&addr(5)), vec![addr(4)]);
    }

    #[test]
    fn test_destinations_via_next_hop() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 11, 1000));
        table.upsert(route(6, 2, 12, 1000));
        table.upsert(route(7, 3, 13, 1000));
        table.upsert(route(8, 2, 14, 1000));
        table.invalidate(&addr(8), 1000, 0);

        let via = table.destinations_via(&addr(2));
        assert_eq!(via.len(), 2);
        assert_eq!(via.get(&addr(5)), Some(&11));
        assert_eq!(via.get(&addr(6)), Some(&12));

        table.invalidate_all(via.keys(), 1000, 0);
        assert!(table.lookup_valid(&addr(5)).is_none());
        assert!(table.lookup_valid(&addr(7)).is_some());
    }

    #[test]
    fn test_purge_lifecycle() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));
        table.upsert(route(6, 2, 1, 5000));
        table.upsert(RouteEntry::in_search(addr(7), InterfaceId(0), 1, 10, 0));

        let outcome = table.purge(2000, 1000);
        assert_eq!(outcome.invalidated, vec![addr(5)]);
        assert!(outcome.removed.is_empty());
        assert_eq!(table.lookup(&addr(5)).unwrap().state(), RouteState::Invalid);
        assert_eq!(table.lookup(&addr(7)).unwrap().state(), RouteState::InSearch);

        // Still within the delete period
        let outcome = table.purge(2000, 2500);
        assert!(outcome.removed.is_empty());

        let outcome = table.purge(2000, 3000);
        assert_eq!(outcome.removed, vec![addr(5)]);
        assert!(!table.contains(&addr(5)));
        assert!(table.contains(&addr(6)));
    }

    #[test]
    fn test_purge_waits_for_precursors() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));
        table.add_precursor(&addr(5), addr(3));
        table.invalidate(&addr(5), 1000, 0);

        let outcome = table.purge(1000, 1000);
        assert!(outcome.removed.is_empty());
        assert!(table.precursors(&addr(5)).is_empty());

        let outcome = table.purge(1000, 1001);
        assert_eq!(outcome.removed, vec![addr(5)]);
    }

    #[test]
    fn test_delete_routes_with_interface() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 1000));
        let mut other = route(6, 2, 1, 1000);
        other.set_interface(InterfaceId(1));
        table.upsert(other);

        assert_eq!(table.delete_routes_with_interface(InterfaceId(1)), vec![addr(6)]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_dump_format() {
        let mut table = RoutingTable::new();
        table.upsert(route(5, 2, 1, 2500));
        let dump = table.dump(1000).to_string();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Destination"));
        assert!(lines[1].starts_with("10.0.0.5"));
        assert!(lines[1].contains("10.0.0.2"));
        assert!(lines[1].contains("UP"));
        assert!(lines[1].ends_with("1.50s"));
    }
}
