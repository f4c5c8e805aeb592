//! RREQ handling and route replies generated from it.

use super::{Received, relay_ttl};
use crate::node::Node;
use crate::protocol::{RouteReply, RouteRequest};
use crate::routing::{RouteEntry, RouteState, seqno_newer};
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::{InterfaceId, Transport};
use std::net::Ipv4Addr;
use tracing::{debug, trace};

/// Clamp a millisecond lifetime into the 32-bit wire field.
pub(in crate::node) fn wire_lifetime(lifetime_ms: u64) -> u32 {
    u32::try_from(lifetime_ms).unwrap_or(u32::MAX)
}

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Handle an inbound route request.
    ///
    /// Processing steps:
    /// 1. Ignore requests from blacklisted neighbors and duplicates
    /// 2. Increment the hop count
    /// 3. Install or refresh the reverse route to the originator
    /// 4. Reply if we are the destination
    /// 5. Reply on the destination's behalf if we hold a fresh enough
    ///    route and the request allows it
    /// 6. Otherwise rebroadcast with a decremented TTL
    pub(in crate::node) fn handle_route_request(&mut self, rx: Received, mut rreq: RouteRequest) {
        let now_ms = self.now_ms();

        if self.neighbors.is_blacklisted(&rx.sender, now_ms) {
            debug!(from = %rx.sender, "Ignoring RREQ from blacklisted neighbor");
            return;
        }
        if self.rreq_ids.is_duplicate(rreq.origin, rreq.request_id, now_ms) {
            trace!(
                from = %rx.sender,
                origin = %rreq.origin,
                id = rreq.request_id,
                "Duplicate RREQ"
            );
            return;
        }

        let hop_count = rreq.hop_count.saturating_add(1);
        rreq.hop_count = hop_count;

        debug!(
            from = %rx.sender,
            origin = %rreq.origin,
            dst = %rreq.dst,
            id = rreq.request_id,
            hops = hop_count,
            "Received RREQ"
        );

        self.update_reverse_route(&rreq, rx);

        if self.config.aodv.enable_hello() {
            let lifetime_ms = self.config.aodv.hello_lifetime_ms();
            self.neighbors.touch(rx.sender, lifetime_ms, now_ms);
        }

        if self.is_local_address(&rreq.dst) {
            self.send_reply(&rreq);
            return;
        }

        if let Some(to_dst) = self.routes.lookup(&rreq.dst) {
            if to_dst.next_hop() == rx.sender {
                debug!(dst = %rreq.dst, from = %rx.sender, "Dropping RREQ, sender is our next hop to the destination");
                return;
            }

            let fresh_enough = rreq.unknown_seqno()
                || to_dst.seqno() == rreq.dst_seqno
                || seqno_newer(to_dst.seqno(), rreq.dst_seqno);
            if to_dst.valid_seqno() && fresh_enough {
                if !rreq.destination_only() && to_dst.is_usable() {
                    self.send_reply_by_intermediate(&rreq);
                    return;
                }
                rreq.dst_seqno = to_dst.seqno();
                rreq.set_unknown_seqno(false);
            }
        }

        let Some(ttl) = relay_ttl(rx.ttl, hop_count, self.config.aodv.net_diameter()) else {
            trace!(origin = %rreq.origin, dst = %rreq.dst, "RREQ reached its TTL, not rebroadcasting");
            return;
        };

        trace!(origin = %rreq.origin, dst = %rreq.dst, ttl, "Rebroadcasting RREQ");
        self.broadcast_message(ttl, |_| rreq.clone());
        self.last_broadcast_ms = Some(now_ms);
    }

    /// Install or refresh the route back to the originator of `rreq`.
    fn update_reverse_route(&mut self, rreq: &RouteRequest, rx: Received) {
        let now_ms = self.now_ms();
        let aodv = &self.config.aodv;
        let hop_count = rreq.hop_count;
        let minimal_lifetime_ms = (2 * aodv.net_traversal_time_ms())
            .saturating_sub(2 * hop_count as u64 * aodv.node_traversal_time_ms());

        match self.routes.lookup_mut(&rreq.origin) {
            Some(entry) => {
                if !entry.valid_seqno() || seqno_newer(rreq.origin_seqno, entry.seqno()) {
                    entry.set_seqno(rreq.origin_seqno);
                }
                let lifetime_ms = minimal_lifetime_ms.max(entry.lifetime_ms(now_ms));
                let state = if entry.state() == RouteState::Valid {
                    RouteState::Valid
                } else {
                    RouteState::ValidNoData
                };
                entry.set_valid_seqno(true);
                entry.set_next_hop(rx.sender);
                entry.set_interface(rx.interface);
                entry.set_hop_count(hop_count);
                entry.set_state(state);
                entry.reset_rreq_count();
                entry.set_lifetime(lifetime_ms, now_ms);
            }
            None => {
                let mut entry = RouteEntry::new(
                    rreq.origin,
                    true,
                    rreq.origin_seqno,
                    rx.interface,
                    hop_count,
                    rx.sender,
                    minimal_lifetime_ms,
                    now_ms,
                );
                entry.set_state(RouteState::ValidNoData);
                self.routes.upsert(entry);
            }
        }

        trace!(origin = %rreq.origin, via = %rx.sender, hops = hop_count, "Reverse route updated");

        if self.queue.has(&rreq.origin) {
            self.send_packets_from_queue(rreq.origin);
        }
    }

    /// Reply to a request for one of our own addresses.
    ///
    /// Our sequence number is bumped when the requester asks for exactly
    /// the next one.
    fn send_reply(&mut self, rreq: &RouteRequest) {
        if !rreq.unknown_seqno() && rreq.dst_seqno == self.seqno.wrapping_add(1) {
            self.seqno = self.seqno.wrapping_add(1);
        }

        let Some((interface, next_hop, hops)) = self.reverse_hop(&rreq.origin) else {
            debug!(origin = %rreq.origin, "No reverse route for RREP");
            return;
        };

        let rrep = RouteReply::new(
            0,
            0,
            rreq.dst,
            self.seqno,
            rreq.origin,
            wire_lifetime(self.config.aodv.my_route_timeout_ms()),
        );

        debug!(origin = %rreq.origin, via = %next_hop, seqno = self.seqno, "Sending RREP as destination");
        self.send_message(interface, next_hop, hops, &rrep);
    }

    /// Reply on behalf of the destination using our own route to it.
    ///
    /// The reply asks for an acknowledgement when the destination is one
    /// hop away. Each end of the path becomes a precursor of the route to
    /// the other end. With the gratuitous flag the destination is also
    /// told the route back to the originator.
    fn send_reply_by_intermediate(&mut self, rreq: &RouteRequest) {
        let now_ms = self.now_ms();
        let (Some(to_dst), Some(to_origin)) = (
            self.routes.lookup(&rreq.dst).cloned(),
            self.routes.lookup(&rreq.origin).cloned(),
        ) else {
            return;
        };

        let mut rrep = RouteReply::new(
            0,
            to_dst.hop_count(),
            to_dst.destination(),
            to_dst.seqno(),
            to_origin.destination(),
            wire_lifetime(to_dst.lifetime_ms(now_ms)),
        );

        if to_dst.hop_count() == 1 {
            rrep.set_ack_required(true);
            let wait_ms = self.config.aodv.next_hop_wait_ms();
            self.schedule_timer(wait_ms, TimerEvent::AckTimeout(to_origin.next_hop()));
        }

        self.routes.add_precursor(&to_dst.destination(), to_origin.next_hop());
        self.routes.add_precursor(&to_origin.destination(), to_dst.next_hop());

        debug!(
            origin = %rreq.origin,
            dst = %rreq.dst,
            via = %to_origin.next_hop(),
            ack = rrep.ack_required(),
            "Sending RREP on behalf of destination"
        );
        self.send_message(to_origin.interface(), to_origin.next_hop(), to_origin.hop_count(), &rrep);

        if rreq.gratuitous_rrep() {
            let gratuitous = RouteReply::new(
                0,
                to_origin.hop_count(),
                to_origin.destination(),
                to_origin.seqno(),
                to_dst.destination(),
                wire_lifetime(to_origin.lifetime_ms(now_ms)),
            );
            debug!(dst = %rreq.dst, origin = %rreq.origin, "Sending gratuitous RREP to destination");
            self.send_message(to_dst.interface(), to_dst.next_hop(), to_dst.hop_count(), &gratuitous);
        }
    }

    /// Interface, next hop and hop count of the usable route to `dst`.
    pub(in crate::node) fn reverse_hop(&self, dst: &Ipv4Addr) -> Option<(InterfaceId, Ipv4Addr, u8)> {
        self.routes
            .lookup_valid(dst)
            .map(|e| (e.interface(), e.next_hop(), e.hop_count()))
    }
}
