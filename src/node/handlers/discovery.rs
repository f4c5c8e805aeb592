//! Outbound routing and on-demand route discovery.
//!
//! A packet for a destination without a usable route is buffered in the
//! request queue and an RREQ goes out. Discovery uses an expanding ring:
//! the first request is flooded with a small TTL and each retry widens it
//! until the network diameter is reached. Attempts at the full diameter
//! back off exponentially and are bounded by the retry limit.

use crate::node::{Node, NodeError};
use crate::packet::{DataPacket, ErrorFn, ForwardError, ForwardFn, Route};
use crate::protocol::RouteRequest;
use crate::queue::{Enqueued, QueueEntry};
use crate::routing::{RouteEntry, RouteState};
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::Transport;
use std::net::Ipv4Addr;
use tracing::{debug, info, trace};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Route a locally originated data packet.
    ///
    /// With a usable route the packet is handed to `on_route` right away
    /// and the route's lifetime is extended. Otherwise it waits in the
    /// request queue while a discovery runs; `on_route` or `on_error` is
    /// invoked once the outcome is known.
    pub fn route_output(
        &mut self,
        mut packet: DataPacket,
        on_route: ForwardFn,
        on_error: Option<ErrorFn>,
    ) -> Result<(), NodeError> {
        if !self.is_running() {
            return Err(NodeError::NotStarted);
        }
        let Some(primary) = self.interfaces.values().next().copied() else {
            if let Some(on_error) = on_error {
                on_error(packet, ForwardError::NoInterface);
            }
            return Ok(());
        };

        if packet.source.is_unspecified() {
            packet.source = primary.local;
        }
        let dst = packet.destination;

        if self.is_broadcast_address(&dst) {
            let route = Route {
                destination: dst,
                source: primary.local,
                gateway: dst,
                interface: primary.id,
            };
            on_route(route, packet);
            return Ok(());
        }

        if let Some(route) = self
            .routes
            .lookup_valid(&dst)
            .and_then(|entry| self.route_for(entry))
        {
            let active_ms = self.config.aodv.active_route_timeout_ms();
            self.update_route_lifetime(&dst, active_ms);
            self.update_route_lifetime(&route.gateway, active_ms);
            self.routes.set_entry_state(&dst, RouteState::Valid);
            trace!(route = %route, id = packet.id, "Route found");
            on_route(route, packet);
            return Ok(());
        }

        self.defer_route_output(packet, on_route, on_error);
        self.drain_link_failures();
        Ok(())
    }

    /// Buffer a packet and start a discovery unless one is running.
    fn defer_route_output(&mut self, packet: DataPacket, on_route: ForwardFn, on_error: Option<ErrorFn>) {
        let now_ms = self.now_ms();
        let dst = packet.destination;
        let id = packet.id;

        match self.queue.enqueue(QueueEntry::new(packet, on_route, on_error, now_ms)) {
            Enqueued::Queued => {
                trace!(dst = %dst, id, queued = self.queue.len_for(&dst), "Packet queued for route discovery");
            }
            Enqueued::DroppedOldest(old) => {
                debug!(dst = %dst, dropped = old.packet().id, "Request queue full, dropping oldest packet");
                let (packet, _, on_error) = old.into_parts();
                if let Some(on_error) = on_error {
                    on_error(packet, ForwardError::QueueOverflow { destination: dst });
                }
            }
            Enqueued::Duplicate(_) => {
                trace!(dst = %dst, id, "Packet already queued");
                return;
            }
        }

        let searching = self.routes.lookup(&dst).is_some_and(|e| e.state() == RouteState::InSearch)
            || self.is_timer_pending(&TimerEvent::RreqRetry(dst))
            || self.is_timer_pending(&TimerEvent::DeferredRequest(dst));
        if !searching {
            self.send_request(dst);
        }
    }

    /// Broadcast an RREQ for `dst`.
    ///
    /// Processing steps:
    /// 1. Defer to the next rate window when the RREQ budget is spent
    /// 2. Pick the TTL from the previous attempt (expanding ring)
    /// 3. Mark the route as being searched
    /// 4. Bump our sequence number and request id
    /// 5. Flood the request on every interface and arm the retry timer
    pub(in crate::node) fn send_request(&mut self, dst: Ipv4Addr) {
        let now_ms = self.now_ms();

        if !self.rreq_limiter.try_acquire() {
            let delay_ms = self.rreq_limiter.ms_until_reset(now_ms) + 1;
            debug!(dst = %dst, delay_ms, "RREQ rate limit reached, deferring");
            self.schedule_timer(delay_ms, TimerEvent::DeferredRequest(dst));
            return;
        }

        let Some(primary) = self.interfaces.keys().next().copied() else {
            return;
        };

        let aodv = &self.config.aodv;
        let (ttl_start, ttl_increment, ttl_threshold, net_diameter) =
            (aodv.ttl_start(), aodv.ttl_increment(), aodv.ttl_threshold(), aodv.net_diameter());
        let path_discovery_ms = aodv.path_discovery_time_ms();

        let (ttl, dst_seqno) = match self.routes.lookup_mut(&dst) {
            Some(entry) => {
                let ttl = if entry.state() == RouteState::InSearch {
                    let next = entry.hop_count().saturating_add(ttl_increment);
                    if next > ttl_threshold { net_diameter } else { next }
                } else {
                    entry.hop_count().saturating_add(ttl_increment).min(net_diameter)
                };
                if ttl == net_diameter {
                    entry.increment_rreq_count();
                }
                let dst_seqno = entry.valid_seqno().then_some(entry.seqno());
                entry.set_hop_count(ttl);
                entry.set_state(RouteState::InSearch);
                entry.set_next_hop(Ipv4Addr::UNSPECIFIED);
                entry.set_lifetime(path_discovery_ms, now_ms);
                (ttl, dst_seqno)
            }
            None => {
                let ttl = ttl_start.min(net_diameter);
                let mut entry = RouteEntry::in_search(dst, primary, ttl, path_discovery_ms, now_ms);
                if ttl == net_diameter {
                    entry.increment_rreq_count();
                }
                self.routes.upsert(entry);
                (ttl, None)
            }
        };

        self.seqno = self.seqno.wrapping_add(1);
        self.request_id = self.request_id.wrapping_add(1);

        let mut rreq = RouteRequest::new(
            0,
            self.request_id,
            dst,
            dst_seqno.unwrap_or(0),
            Ipv4Addr::UNSPECIFIED,
            self.seqno,
        );
        rreq.set_unknown_seqno(dst_seqno.is_none());
        rreq.set_gratuitous_rrep(self.config.aodv.gratuitous_reply());
        rreq.set_destination_only(self.config.aodv.destination_only());

        let locals: Vec<Ipv4Addr> = self.interfaces.values().map(|i| i.local).collect();
        for local in locals {
            self.rreq_ids.is_duplicate(local, self.request_id, now_ms);
        }

        debug!(dst = %dst, ttl, id = self.request_id, seqno = self.seqno, "Sending RREQ");
        self.broadcast_message(ttl, |iface| {
            let mut rreq = rreq.clone();
            rreq.origin = iface.local;
            rreq
        });
        self.last_broadcast_ms = Some(now_ms);

        self.schedule_rreq_retry(dst);
    }

    /// Arm the discovery timer for `dst`.
    ///
    /// Below the network diameter the wait covers a round trip to the ring
    /// edge. At the diameter it doubles with every attempt.
    fn schedule_rreq_retry(&mut self, dst: Ipv4Addr) {
        let Some(entry) = self.routes.lookup(&dst) else {
            return;
        };
        let aodv = &self.config.aodv;

        let delay_ms = if entry.hop_count() < aodv.net_diameter() {
            2 * aodv.node_traversal_time_ms() * (entry.hop_count() as u64 + aodv.timeout_buffer() as u64)
        } else {
            let backoff = entry.rreq_count().saturating_sub(1).min(16);
            aodv.net_traversal_time_ms() << backoff
        };

        trace!(dst = %dst, delay_ms, "Scheduled RREQ retry");
        self.schedule_timer(delay_ms, TimerEvent::RreqRetry(dst));
    }

    /// The discovery timer for `dst` expired.
    ///
    /// Retries with a wider ring until the retry limit at the network
    /// diameter is used up, then gives up and fails the queued packets.
    pub(in crate::node) fn handle_discovery_timeout(&mut self, dst: Ipv4Addr) {
        if self.routes.lookup_valid(&dst).is_some() {
            self.send_packets_from_queue(dst);
            return;
        }

        let Some(entry) = self.routes.lookup(&dst) else {
            self.drop_queued_packets(dst, ForwardError::RouteUnavailable { destination: dst });
            return;
        };

        if entry.rreq_count() >= self.config.aodv.rreq_retries() {
            info!(dst = %dst, attempts = entry.rreq_count(), "Route discovery failed");
            self.routes.delete_route(&dst);
            self.drop_queued_packets(dst, ForwardError::RouteUnavailable { destination: dst });
            return;
        }

        if entry.state() == RouteState::InSearch {
            debug!(dst = %dst, last_ttl = entry.hop_count(), "No RREP yet, retrying discovery");
            self.send_request(dst);
        } else {
            self.drop_queued_packets(dst, ForwardError::RouteUnavailable { destination: dst });
        }
    }

    /// A discovery held back by the rate limit may go out now.
    pub(in crate::node) fn handle_deferred_request(&mut self, dst: Ipv4Addr) {
        if self.routes.lookup_valid(&dst).is_some() {
            self.send_packets_from_queue(dst);
            return;
        }

        if !self.queue.has(&dst) {
            trace!(dst = %dst, "Deferred RREQ no longer needed");
            if self.routes.lookup(&dst).is_some_and(|e| e.state() == RouteState::InSearch) {
                self.routes.delete_route(&dst);
            }
            return;
        }

        self.send_request(dst);
    }

    /// Stop the discovery for `dst` and hand its queued packets to their
    /// forwarding continuations.
    pub(in crate::node) fn send_packets_from_queue(&mut self, dst: Ipv4Addr) {
        let Some(route) = self
            .routes
            .lookup_valid(&dst)
            .and_then(|entry| self.route_for(entry))
        else {
            return;
        };

        self.cancel_timer(&TimerEvent::RreqRetry(dst));

        let entries = self.queue.dequeue_all(&dst);
        if entries.is_empty() {
            return;
        }

        self.routes.set_entry_state(&dst, RouteState::Valid);
        debug!(route = %route, count = entries.len(), "Sending queued packets");

        for entry in entries {
            let (packet, on_route, _) = entry.into_parts();
            on_route(route, packet);
        }
    }

    /// Fail every packet queued for `dst`.
    pub(in crate::node) fn drop_queued_packets(&mut self, dst: Ipv4Addr, error: ForwardError) {
        let entries = self.queue.drop_for_destination(&dst);
        if entries.is_empty() {
            return;
        }

        debug!(dst = %dst, count = entries.len(), error = %error, "Dropping queued packets");
        for entry in entries {
            let (packet, _, on_error) = entry.into_parts();
            if let Some(on_error) = on_error {
                on_error(packet, error.clone());
            }
        }
    }
}
