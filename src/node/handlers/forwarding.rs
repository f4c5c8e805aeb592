//! Data packet input: local delivery, broadcast re-flooding and unicast
//! forwarding.

use crate::node::Node;
use crate::packet::{DataPacket, DeliverFn, ErrorFn, ForwardError, ForwardFn, Route};
use crate::routing::RouteState;
use crate::timer::Scheduler;
use crate::transport::{InterfaceId, Transport};
use std::net::Ipv4Addr;
use tracing::{debug, trace};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Route a data packet received on `interface`.
    ///
    /// Processing steps:
    /// 1. Drop our own packets coming back to us
    /// 2. Broadcasts: suppress duplicates, deliver a copy locally and
    ///    re-flood while the TTL allows
    /// 3. Packets for one of our addresses: deliver locally
    /// 4. Anything else: forward along a usable route, or report the
    ///    missing route with an RERR toward the source
    ///
    /// Returns false when the packet is not ours to handle (multicast, or
    /// a unicast we could not forward). The packet TTL is only consulted
    /// for broadcast re-flooding.
    pub fn route_input(
        &mut self,
        mut packet: DataPacket,
        interface: InterfaceId,
        on_forward: ForwardFn,
        on_local: DeliverFn,
        on_error: ErrorFn,
    ) -> bool {
        if !self.is_running() || self.interfaces.is_empty() {
            return false;
        }

        let origin = packet.source;
        let dst = packet.destination;
        let active_ms = self.config.aodv.active_route_timeout_ms();

        if self.is_local_address(&origin) {
            trace!(dst = %dst, id = packet.id, "Own packet came back, dropping");
            return true;
        }
        if dst.is_multicast() {
            return false;
        }

        if self.is_broadcast_address(&dst) {
            let now_ms = self.now_ms();
            if self.dpd.is_duplicate(origin, packet.id, now_ms) {
                trace!(source = %origin, id = packet.id, "Duplicate broadcast packet");
                return true;
            }
            self.update_route_lifetime(&origin, active_ms);
            on_local(packet.clone(), interface);

            if !self.config.aodv.enable_broadcast() || packet.ttl <= 1 {
                return true;
            }
            let Some(source) = self.local_address(interface) else {
                return true;
            };
            packet.ttl -= 1;
            let route = Route {
                destination: dst,
                source,
                gateway: dst,
                interface,
            };
            trace!(source = %origin, id = packet.id, ttl = packet.ttl, "Re-flooding broadcast packet");
            on_forward(route, packet);
            return true;
        }

        if self.is_local_address(&dst) {
            self.update_route_lifetime(&origin, active_ms);
            if let Some(previous_hop) = self.routes.lookup_valid(&origin).map(|e| e.next_hop()) {
                self.update_route_lifetime(&previous_hop, active_ms);
                self.touch_neighbor(previous_hop, active_ms);
            }
            on_local(packet, interface);
            return true;
        }

        let forwarded = self.forward_packet(packet, on_forward, on_error);
        self.drain_link_failures();
        forwarded
    }

    /// Forward a unicast packet for another node.
    ///
    /// The lifetimes of the routes to the source, the destination, the next
    /// hop and the previous hop are all refreshed, since a working path is
    /// expected to be symmetric.
    fn forward_packet(&mut self, packet: DataPacket, on_forward: ForwardFn, on_error: ErrorFn) -> bool {
        let origin = packet.source;
        let dst = packet.destination;
        let active_ms = self.config.aodv.active_route_timeout_ms();

        let route = self
            .routes
            .lookup_valid(&dst)
            .and_then(|entry| self.route_for(entry));

        if let Some(route) = route {
            self.update_route_lifetime(&origin, active_ms);
            self.update_route_lifetime(&dst, active_ms);
            self.update_route_lifetime(&route.gateway, active_ms);
            self.touch_neighbor(route.gateway, active_ms);

            if let Some(previous_hop) = self.routes.lookup(&origin).map(|e| e.next_hop()) {
                self.update_route_lifetime(&previous_hop, active_ms);
                self.touch_neighbor(previous_hop, active_ms);
            }

            self.routes.set_entry_state(&dst, RouteState::Valid);
            trace!(route = %route, source = %origin, id = packet.id, "Forwarding packet");
            on_forward(route, packet);
            return true;
        }

        let dst_seqno = self
            .routes
            .lookup(&dst)
            .filter(|e| e.valid_seqno())
            .map(|e| e.seqno())
            .unwrap_or(0);

        debug!(dst = %dst, source = %origin, id = packet.id, "No route to forward packet");
        self.send_rerr_no_route(dst, dst_seqno, origin);
        on_error(packet, ForwardError::RouteUnavailable { destination: dst });
        false
    }

    /// Extend a neighbor's liveness when hellos are in use.
    fn touch_neighbor(&mut self, neighbor: Ipv4Addr, lifetime_ms: u64) {
        if !self.config.aodv.enable_hello() || neighbor.is_unspecified() {
            return;
        }
        let now_ms = self.now_ms();
        self.neighbors.touch(neighbor, lifetime_ms, now_ms);
    }
}
