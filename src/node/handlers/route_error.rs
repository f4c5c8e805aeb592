//! Route error (RERR) generation, propagation and link failure handling.

use super::Received;
use crate::node::Node;
use crate::protocol::RouteError;
use crate::routing::seqno_newer;
use crate::timer::Scheduler;
use crate::transport::{InterfaceId, Transport};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use tracing::{debug, info, trace, warn};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Report a broken link to a neighbor.
    ///
    /// Called by the owner of the node when the link layer fails to
    /// deliver to `neighbor`. Every route through it is invalidated and the
    /// affected precursors are told with an RERR.
    pub fn notify_link_failure(&mut self, neighbor: Ipv4Addr) {
        if !self.is_running() {
            return;
        }
        self.handle_link_failure(neighbor);
        self.drain_link_failures();
    }

    /// Handle an inbound route error.
    ///
    /// Processing steps:
    /// 1. Keep only destinations we reach through the sender
    /// 2. Adopt the advertised sequence numbers when newer
    /// 3. Tell our own precursors for those destinations
    /// 4. Invalidate the routes
    pub(in crate::node) fn handle_route_error(&mut self, rx: Received, rerr: RouteError) {
        let via_sender = self.routes.destinations_via(&rx.sender);
        let unreachable: BTreeMap<Ipv4Addr, u32> = rerr
            .unreachable()
            .filter(|(dst, _)| via_sender.contains_key(dst))
            .collect();

        if unreachable.is_empty() {
            trace!(from = %rx.sender, listed = rerr.unreachable_count(), "RERR lists no route through sender");
            return;
        }

        debug!(
            from = %rx.sender,
            listed = rerr.unreachable_count(),
            affected = unreachable.len(),
            "Received RERR"
        );

        for (dst, seqno) in &unreachable {
            if let Some(entry) = self.routes.lookup_mut(dst)
                && seqno_newer(*seqno, entry.seqno())
            {
                entry.set_seqno(*seqno);
            }
        }

        self.send_route_errors(&unreachable);

        let now_ms = self.now_ms();
        let delete_period_ms = self.config.aodv.delete_period_ms();
        self.routes.invalidate_all(unreachable.keys(), delete_period_ms, now_ms);
    }

    /// The link to `next_hop` is gone.
    ///
    /// The route to the neighbor itself and every usable route through it
    /// are listed in RERRs to their precursors, then invalidated.
    pub(in crate::node) fn handle_link_failure(&mut self, next_hop: Ipv4Addr) {
        self.neighbors.remove(&next_hop);

        let Some(to_next_hop) = self.routes.lookup(&next_hop) else {
            trace!(neighbor = %next_hop, "Link failure to neighbor without a route");
            return;
        };

        let mut unreachable = BTreeMap::new();
        unreachable.insert(next_hop, to_next_hop.seqno());
        unreachable.extend(self.routes.destinations_via(&next_hop));

        info!(neighbor = %next_hop, routes = unreachable.len(), "Link to neighbor broken");

        self.send_route_errors(&unreachable);

        let now_ms = self.now_ms();
        let delete_period_ms = self.config.aodv.delete_period_ms();
        self.routes.invalidate_all(unreachable.keys(), delete_period_ms, now_ms);
    }

    /// Tell the precursors of `unreachable` destinations about them.
    ///
    /// Destinations are packed into as many RERRs as needed. Precursors of
    /// destinations that were reported are cleared.
    fn send_route_errors(&mut self, unreachable: &BTreeMap<Ipv4Addr, u32>) {
        let mut rerr = RouteError::new();
        let mut precursors = BTreeSet::new();
        let mut reported = Vec::new();
        let mut batch = Vec::new();

        for (&dst, &seqno) in unreachable {
            if rerr.is_full() {
                if self.send_rerr_message(&rerr, &precursors) {
                    reported.append(&mut batch);
                }
                batch.clear();
                rerr.clear();
            }
            if let Err(e) = rerr.add_unreachable(dst, seqno) {
                warn!(dst = %dst, error = %e, "Failed to list unreachable destination");
                continue;
            }
            precursors.extend(self.routes.precursors(&dst));
            batch.push(dst);
        }

        if !rerr.is_empty() && self.send_rerr_message(&rerr, &precursors) {
            reported.append(&mut batch);
        }

        for dst in &reported {
            if let Some(entry) = self.routes.lookup_mut(dst) {
                entry.clear_precursors();
            }
        }
    }

    /// Send one RERR to `precursors`.
    ///
    /// A single precursor is reached by unicast. Several are reached by one
    /// broadcast per interface that has a valid route to any of them.
    /// Returns false if nothing was sent.
    fn send_rerr_message(&mut self, rerr: &RouteError, precursors: &BTreeSet<Ipv4Addr>) -> bool {
        if precursors.is_empty() {
            trace!(unreachable = %rerr, "No precursors, RERR not sent");
            return false;
        }

        if precursors.len() == 1 {
            let Some(&precursor) = precursors.first() else {
                return false;
            };
            let Some((interface, _, _)) = self.reverse_hop(&precursor) else {
                debug!(precursor = %precursor, "No valid route to precursor, RERR not sent");
                return false;
            };
            if !self.rerr_limiter.try_acquire() {
                debug!(unreachable = %rerr, "RERR rate limit reached, dropping");
                return false;
            }
            debug!(to = %precursor, unreachable = %rerr, "Sending RERR");
            self.send_message(interface, precursor, 1, rerr);
            return true;
        }

        let interfaces: BTreeSet<InterfaceId> = precursors
            .iter()
            .filter_map(|p| self.reverse_hop(p).map(|(iface, _, _)| iface))
            .collect();
        if interfaces.is_empty() {
            debug!(precursors = precursors.len(), "No valid route to any precursor, RERR not sent");
            return false;
        }
        if !self.rerr_limiter.try_acquire() {
            debug!(unreachable = %rerr, "RERR rate limit reached, dropping");
            return false;
        }

        for interface in interfaces {
            let Some(broadcast) = self.interfaces.get(&interface).map(|i| i.broadcast) else {
                continue;
            };
            debug!(iface = %interface, unreachable = %rerr, "Broadcasting RERR");
            self.send_message(interface, broadcast, 1, rerr);
        }
        true
    }

    /// Tell the originator of a data packet that we have no route to
    /// forward it.
    ///
    /// Unicast along the reverse route if one is valid, otherwise broadcast
    /// on every interface.
    pub(in crate::node) fn send_rerr_no_route(&mut self, dst: Ipv4Addr, dst_seqno: u32, origin: Ipv4Addr) {
        if !self.rerr_limiter.try_acquire() {
            debug!(dst = %dst, origin = %origin, "RERR rate limit reached, dropping");
            return;
        }

        let mut rerr = RouteError::new();
        if rerr.add_unreachable(dst, dst_seqno).is_err() {
            return;
        }

        match self.reverse_hop(&origin) {
            Some((interface, next_hop, _)) => {
                debug!(dst = %dst, origin = %origin, via = %next_hop, "Sending RERR for undeliverable packet");
                self.send_message(interface, next_hop, 1, &rerr);
            }
            None => {
                debug!(dst = %dst, origin = %origin, "Broadcasting RERR for undeliverable packet");
                self.broadcast_message(1, |_| rerr.clone());
            }
        }
    }
}
