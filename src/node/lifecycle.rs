//! Node lifecycle management: start, stop, and interface changes.

use super::{Node, NodeError, NodeState, RATE_WINDOW_MS};
use crate::cpda::select_keys;
use crate::packet::ForwardError;
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::{Interface, InterfaceId, Transport};
use rand::Rng;
use tracing::{debug, info};

/// Upper bound of the random delay before the first hello.
pub(super) const HELLO_START_JITTER_MS: u64 = 100;

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Start the node.
    ///
    /// Arms the periodic timers (rate windows, maintenance, hello) and,
    /// when CPDA is enabled, selects this node's keys and schedules the key
    /// advertisement and, on the query node, the cluster query.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if !self.state.can_start() {
            return Err(NodeError::AlreadyStarted);
        }
        if self.interfaces.is_empty() {
            return Err(NodeError::NoInterface);
        }

        let now_ms = self.now_ms();
        self.rreq_limiter.reset(now_ms);
        self.rerr_limiter.reset(now_ms);
        self.schedule_timer(RATE_WINDOW_MS, TimerEvent::RreqRateReset);
        self.schedule_timer(RATE_WINDOW_MS, TimerEvent::RerrRateReset);
        self.schedule_timer(self.config.aodv.maintenance_interval_ms(), TimerEvent::Maintenance);

        if self.config.aodv.enable_hello() {
            let jitter_ms = self.rng.gen_range(0..=HELLO_START_JITTER_MS);
            self.schedule_timer(jitter_ms, TimerEvent::Hello);
        }

        if self.config.cpda.enabled() {
            let cpda = &self.config.cpda;
            let (total, selection, key_jitter_ms) = (cpda.key_total(), cpda.key_selection(), cpda.key_jitter_ms());
            self.keys = select_keys(&mut self.rng, total, selection);
            debug!(keys = ?self.keys, "Selected CPDA keys");

            let jitter_ms = self.rng.gen_range(0..=key_jitter_ms);
            self.schedule_timer(jitter_ms, TimerEvent::SendKey);

            if self.config.cpda.enable_query_node() {
                self.schedule_timer(self.config.cpda.query_delay_ms(), TimerEvent::SendQuery);
            }
        }

        self.state = NodeState::Running;
        info!(
            address = ?self.primary_address(),
            interfaces = self.interfaces.len(),
            cpda = self.config.cpda.enabled(),
            query_node = self.config.cpda.enable_query_node(),
            "Node started"
        );
        Ok(())
    }

    /// Stop the node.
    ///
    /// Cancels every timer, fails all queued packets and drops the routing,
    /// neighbor and cluster state.
    pub fn stop(&mut self) -> Result<(), NodeError> {
        match self.state {
            NodeState::Running => {}
            NodeState::Stopped => return Err(NodeError::AlreadyStopped),
            NodeState::Created => return Err(NodeError::NotStarted),
        }

        self.cancel_all_timers();

        let destinations: Vec<_> = self.queue.destinations().copied().collect();
        for dst in destinations {
            self.drop_queued_packets(dst, ForwardError::RouteUnavailable { destination: dst });
        }

        self.routes.clear();
        self.neighbors.clear();
        self.key_map = Default::default();
        self.cluster.reset();
        self.keys.clear();
        self.failed_links.clear();
        self.last_broadcast_ms = None;

        self.state = NodeState::Stopped;
        info!(address = ?self.primary_address(), "Node stopped");
        Ok(())
    }

    /// Bring an interface up.
    pub fn add_interface(&mut self, interface: Interface) -> Result<(), NodeError> {
        if self.interfaces.contains_key(&interface.id) {
            return Err(NodeError::InterfaceExists(interface.id));
        }
        self.interfaces.insert(interface.id, interface);
        info!(
            iface = %interface.id,
            local = %interface.local,
            broadcast = %interface.broadcast,
            "Interface up"
        );

        if self.is_running()
            && self.config.aodv.enable_hello()
            && !self.is_timer_pending(&TimerEvent::Hello)
        {
            let jitter_ms = self.rng.gen_range(0..=HELLO_START_JITTER_MS);
            self.schedule_timer(jitter_ms, TimerEvent::Hello);
        }
        Ok(())
    }

    /// Take an interface down, deleting every route through it.
    ///
    /// When the last interface goes away the hello timer stops and the
    /// neighbor and routing tables are cleared.
    pub fn remove_interface(&mut self, id: InterfaceId) -> Result<Interface, NodeError> {
        let interface = self
            .interfaces
            .remove(&id)
            .ok_or(NodeError::UnknownInterface(id))?;

        let removed = self.routes.delete_routes_with_interface(id);
        info!(iface = %id, routes_removed = removed.len(), "Interface down");

        if self.interfaces.is_empty() {
            self.cancel_timer(&TimerEvent::Hello);
            self.neighbors.clear();
            self.routes.clear();
            debug!("No interfaces left, cleared neighbor and routing tables");
        }
        Ok(interface)
    }
}
