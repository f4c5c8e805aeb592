//! Hello transmission and processing.

use super::Received;
use super::request::wire_lifetime;
use crate::node::Node;
use crate::protocol::RouteReply;
use crate::routing::{RouteEntry, RouteState};
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::Transport;
use tracing::trace;

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Hello timer tick.
    ///
    /// A broadcast sent since the previous tick already told neighbors we
    /// are alive, so the hello is skipped and the next tick is scheduled
    /// one interval after that broadcast.
    pub(in crate::node) fn handle_hello_timer(&mut self) {
        let now_ms = self.now_ms();
        let interval_ms = self.config.aodv.hello_interval_ms();

        let delay_ms = match self.last_broadcast_ms.take() {
            Some(sent_at_ms) => {
                let elapsed_ms = now_ms.saturating_sub(sent_at_ms);
                trace!(elapsed_ms, "Recent broadcast, skipping hello");
                interval_ms.saturating_sub(elapsed_ms)
            }
            None => {
                self.send_hello();
                interval_ms
            }
        };

        self.schedule_timer(delay_ms, TimerEvent::Hello);
    }

    /// Broadcast a hello on every interface with TTL 1.
    pub(in crate::node) fn send_hello(&mut self) {
        let seqno = self.seqno;
        let lifetime = wire_lifetime(self.config.aodv.hello_lifetime_ms());
        let sent = self.broadcast_message(1, |iface| RouteReply::hello(iface.local, seqno, lifetime));
        trace!(seqno, interfaces = sent, "Sent hello");
    }

    /// Process a received hello.
    ///
    /// Installs or refreshes the one-hop route to the neighbor and extends
    /// its liveness.
    pub(in crate::node) fn process_hello(&mut self, rx: Received, hello: &RouteReply) {
        let now_ms = self.now_ms();
        let neighbor = hello.dst;
        let lifetime_ms = hello.lifetime_ms as u64;

        trace!(from = %rx.sender, neighbor = %neighbor, seqno = hello.dst_seqno, "Received hello");

        match self.routes.lookup_mut(&neighbor) {
            Some(entry) => {
                let lifetime_ms = lifetime_ms.max(entry.lifetime_ms(now_ms));
                let state = if entry.state() == RouteState::Valid {
                    RouteState::Valid
                } else {
                    RouteState::ValidNoData
                };
                entry.set_seqno(hello.dst_seqno);
                entry.set_valid_seqno(true);
                entry.set_next_hop(neighbor);
                entry.set_interface(rx.interface);
                entry.set_hop_count(1);
                entry.set_state(state);
                entry.reset_rreq_count();
                entry.set_lifetime(lifetime_ms, now_ms);
            }
            None => {
                let mut entry = RouteEntry::new(
                    neighbor,
                    true,
                    hello.dst_seqno,
                    rx.interface,
                    1,
                    neighbor,
                    lifetime_ms,
                    now_ms,
                );
                entry.set_state(RouteState::ValidNoData);
                self.routes.upsert(entry);
            }
        }

        if self.config.aodv.enable_hello() {
            let liveness_ms = self.config.aodv.hello_lifetime_ms();
            self.neighbors.touch(neighbor, liveness_ms, now_ms);
        }

        if self.queue.has(&neighbor) {
            self.send_packets_from_queue(neighbor);
        }
    }
}
