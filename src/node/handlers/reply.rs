//! RREP and RREP-ACK handling.

use super::{Received, relay_ttl};
use crate::node::Node;
use crate::protocol::{RouteReply, RouteReplyAck};
use crate::routing::{RouteEntry, RouteState};
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::Transport;
use std::net::Ipv4Addr;
use tracing::{debug, info, trace};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Handle an inbound route reply.
    ///
    /// Processing steps:
    /// 1. Hellos (destination == origin) go to hello processing
    /// 2. Increment the hop count
    /// 3. Create or update the forward route when the reply is fresher
    /// 4. Acknowledge if the sender asked for it
    /// 5. If we originated the discovery, stop it and flush queued packets
    /// 6. Otherwise record precursors and forward toward the originator
    pub(in crate::node) fn handle_route_reply(&mut self, rx: Received, mut rrep: RouteReply) {
        if rrep.is_hello() {
            self.process_hello(rx, &rrep);
            return;
        }

        let now_ms = self.now_ms();
        let dst = rrep.dst;
        let origin = rrep.origin;
        let hop_count = rrep.hop_count.saturating_add(1);
        rrep.hop_count = hop_count;

        debug!(
            from = %rx.sender,
            dst = %dst,
            origin = %origin,
            seqno = rrep.dst_seqno,
            hops = hop_count,
            "Received RREP"
        );

        if self.is_local_address(&dst) {
            trace!(dst = %dst, "RREP describes one of our addresses, no route installed");
        } else {
            let lifetime_ms = rrep.lifetime_ms as u64;
            match self.routes.lookup_mut(&dst) {
                Some(entry) => {
                    if entry.should_accept(rrep.dst_seqno, hop_count) {
                        entry.refresh_from(rrep.dst_seqno, rx.sender, rx.interface, hop_count, lifetime_ms, now_ms);
                        entry.reset_rreq_count();
                    } else {
                        trace!(dst = %dst, seqno = rrep.dst_seqno, "Keeping existing route, RREP is not fresher");
                    }
                }
                None => {
                    self.routes.upsert(RouteEntry::new(
                        dst,
                        true,
                        rrep.dst_seqno,
                        rx.interface,
                        hop_count,
                        rx.sender,
                        lifetime_ms,
                        now_ms,
                    ));
                }
            }
        }

        if rrep.ack_required() {
            trace!(to = %rx.sender, "Sending RREP-ACK");
            self.send_message(rx.interface, rx.sender, 1, &RouteReplyAck::new());
            rrep.set_ack_required(false);
        }

        if self.is_local_address(&origin) {
            if self.routes.lookup_valid(&dst).is_some() {
                info!(dst = %dst, via = %rx.sender, hops = hop_count, "Route discovered");
                self.cancel_timer(&TimerEvent::DeferredRequest(dst));
                self.send_packets_from_queue(dst);
            }
            return;
        }

        let Some((origin_iface, origin_next_hop, _)) = self.reverse_hop(&origin) else {
            debug!(origin = %origin, "No reverse route, dropping RREP");
            return;
        };
        let active_ms = self.config.aodv.active_route_timeout_ms();
        self.update_route_lifetime(&origin, active_ms);

        if let Some(dst_next_hop) = self.routes.lookup_valid(&dst).map(|e| e.next_hop()) {
            self.routes.add_precursor(&dst, origin_next_hop);
            self.routes.add_precursor(&dst_next_hop, origin_next_hop);
        }
        self.routes.add_precursor(&origin, rx.sender);
        self.routes.add_precursor(&origin_next_hop, rx.sender);

        let Some(ttl) = relay_ttl(rx.ttl, hop_count, self.config.aodv.net_diameter()) else {
            debug!(dst = %dst, origin = %origin, "RREP reached its TTL, dropping");
            return;
        };

        trace!(dst = %dst, origin = %origin, via = %origin_next_hop, ttl, "Forwarding RREP");
        self.send_message(origin_iface, origin_next_hop, ttl, &rrep);
    }

    /// Handle an RREP-ACK: the neighbor heard our reply, so the link is
    /// bidirectional.
    pub(in crate::node) fn handle_route_reply_ack(&mut self, rx: Received) {
        if self.cancel_timer(&TimerEvent::AckTimeout(rx.sender)) {
            debug!(from = %rx.sender, "RREP-ACK received");
        } else {
            trace!(from = %rx.sender, "Unexpected RREP-ACK");
        }

        if self.routes.lookup_valid(&rx.sender).is_some() {
            self.routes.set_entry_state(&rx.sender, RouteState::Valid);
        }
    }

    /// No RREP-ACK arrived in time: treat the link as unidirectional.
    pub(in crate::node) fn handle_ack_timeout(&mut self, neighbor: Ipv4Addr) {
        let now_ms = self.now_ms();
        let duration_ms = self.config.aodv.blacklist_timeout_ms();
        self.neighbors.blacklist(neighbor, duration_ms, now_ms);
        info!(
            neighbor = %neighbor,
            duration_ms,
            "No RREP-ACK, blacklisting neighbor"
        );
    }
}
