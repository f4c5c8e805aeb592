//! Timer dispatch and periodic maintenance.

use crate::node::{Node, RATE_WINDOW_MS};
use crate::packet::ForwardError;
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::Transport;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tracing::{debug, info, trace};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Run every timer that is due at the scheduler's current time.
    ///
    /// Timers scheduled while handling an expiry fire in the same call if
    /// they are already due.
    pub fn process_timers(&mut self) {
        while let Some((id, event)) = self.timers.pop_due() {
            if self.pending_timers.get(&event) != Some(&id) {
                trace!(timer = %id, event = ?event, "Stale timer");
                continue;
            }
            self.pending_timers.remove(&event);

            if !self.is_running() {
                continue;
            }

            trace!(timer = %id, event = ?event, "Timer fired");
            self.handle_timer(event);
            self.drain_link_failures();
        }
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::RreqRetry(dst) => self.handle_discovery_timeout(dst),
            TimerEvent::DeferredRequest(dst) => self.handle_deferred_request(dst),
            TimerEvent::AckTimeout(neighbor) => self.handle_ack_timeout(neighbor),
            TimerEvent::Hello => self.handle_hello_timer(),
            TimerEvent::RreqRateReset => {
                let now_ms = self.now_ms();
                self.rreq_limiter.reset(now_ms);
                self.schedule_timer(RATE_WINDOW_MS, TimerEvent::RreqRateReset);
            }
            TimerEvent::RerrRateReset => {
                let now_ms = self.now_ms();
                self.rerr_limiter.reset(now_ms);
                self.schedule_timer(RATE_WINDOW_MS, TimerEvent::RerrRateReset);
            }
            TimerEvent::Maintenance => {
                self.run_maintenance();
                self.schedule_timer(self.config.aodv.maintenance_interval_ms(), TimerEvent::Maintenance);
            }
            TimerEvent::SendKey => self.send_key(),
            TimerEvent::SendQuery => self.send_query(),
            TimerEvent::JoinTimeout(leader) => self.handle_join_timeout(leader),
        }
    }

    /// Expire neighbors, routes, caches and queued packets.
    ///
    /// An expired neighbor is a broken link: routes through it are
    /// reported and invalidated, and its CPDA state is forgotten.
    pub(in crate::node) fn run_maintenance(&mut self) {
        let now_ms = self.now_ms();

        if self.config.aodv.enable_hello() {
            for neighbor in self.neighbors.purge(now_ms) {
                info!(neighbor = %neighbor, "Neighbor expired");
                self.key_map.remove(&neighbor);
                if self.cluster.remove_member(&neighbor) {
                    info!(member = %neighbor, "Cluster member lost");
                }
                self.handle_link_failure(neighbor);
            }
        }

        let reachable: BTreeSet<Ipv4Addr> = self
            .routes
            .iter()
            .filter(|e| e.is_usable())
            .map(|e| e.destination())
            .collect();
        let neighbors = &self.neighbors;
        self.routes
            .prune_precursors(|p| reachable.contains(p) || neighbors.is_neighbor(p, now_ms));

        let outcome = self.routes.purge(self.config.aodv.delete_period_ms(), now_ms);
        if !outcome.invalidated.is_empty() || !outcome.removed.is_empty() {
            debug!(
                invalidated = outcome.invalidated.len(),
                removed = outcome.removed.len(),
                "Purged routes"
            );
        }

        let expired_ids = self.rreq_ids.purge(now_ms) + self.query_ids.purge(now_ms);
        let expired_packets = self.dpd.purge(now_ms);
        if expired_ids > 0 || expired_packets > 0 {
            trace!(expired_ids, expired_packets, "Purged duplicate caches");
        }

        for entry in self.queue.drop_expired(now_ms) {
            let dst = entry.destination();
            debug!(dst = %dst, id = entry.packet().id, "Queued packet expired");
            let (packet, _, on_error) = entry.into_parts();
            if let Some(on_error) = on_error {
                on_error(packet, ForwardError::RouteUnavailable { destination: dst });
            }
        }
    }
}
