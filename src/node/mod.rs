//! AODV Node Entity
//!
//! Top-level structure representing one routing instance. The Node owns
//! every piece of protocol state: routing table, request queue, neighbor
//! table, duplicate caches, rate limiters and the CPDA cluster state.
//!
//! The node is synchronous and event driven. Inbound datagrams arrive via
//! [`Node::receive`], expired timers via [`Node::process_timers`], and data
//! packets via [`Node::route_output`] / [`Node::route_input`]. Outbound
//! control traffic goes through the [`Transport`] collaborator and all
//! delays through the [`Scheduler`].

mod handlers;
mod lifecycle;
mod rate_limit;
#[cfg(test)]
mod tests;

pub use rate_limit::{ControlRateLimiter, RATE_WINDOW_MS};

use crate::cache::{DuplicatePacketDetection, IdCache};
use crate::config::{Config, ConfigError};
use crate::cpda::{ClusterState, KeyMap};
use crate::neighbor::Neighbors;
use crate::packet::Route;
use crate::protocol::WireMessage;
use crate::queue::RequestQueue;
use crate::routing::{RouteEntry, RouteState, RoutingTable, RoutingTableDump};
use crate::timer::{Scheduler, TimerEvent, TimerId, TimerQueue};
use crate::transport::{Interface, InterfaceId, OutboundDatagram, Transport, TransportError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors related to node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node not started")]
    NotStarted,

    #[error("node already started")]
    AlreadyStarted,

    #[error("node already stopped")]
    AlreadyStopped,

    #[error("no interface configured")]
    NoInterface,

    #[error("interface already exists: {0}")]
    InterfaceExists(InterfaceId),

    #[error("unknown interface: {0}")]
    UnknownInterface(InterfaceId),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Node operational state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created but not started.
    Created,
    /// Fully operational.
    Running,
    /// Stopped.
    Stopped,
}

impl NodeState {
    /// Check if node is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if node can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, NodeState::Created | NodeState::Stopped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Created => "created",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// A routing instance.
///
/// ## Timers
///
/// Every pending timer is keyed by its [`TimerEvent`] in `pending_timers`.
/// Scheduling an event that is already pending replaces the old timer, so
/// at most one timer exists per destination for each kind of wait.
pub struct Node<T: Transport, S: Scheduler = TimerQueue> {
    // === Configuration ===
    /// Loaded configuration.
    config: Config,

    // === State ===
    /// Node operational state.
    state: NodeState,

    // === Collaborators ===
    transport: T,
    timers: S,
    /// Jitter and key selection.
    rng: StdRng,

    // === Interfaces ===
    interfaces: BTreeMap<InterfaceId, Interface>,

    // === Routing ===
    routes: RoutingTable,
    /// Data packets waiting for route discovery.
    queue: RequestQueue,
    neighbors: Neighbors,

    // === Duplicate Suppression ===
    /// (originator, RREQ id) pairs already processed.
    rreq_ids: IdCache,
    /// (root, query id) pairs already processed.
    query_ids: IdCache,
    /// Broadcast data packets already delivered.
    dpd: DuplicatePacketDetection,

    // === Counters ===
    /// Own destination sequence number.
    seqno: u32,
    /// Last RREQ id we originated.
    request_id: u32,
    /// Last CPDA query id we originated.
    query_id: u32,

    // === Rate Limiting ===
    rreq_limiter: ControlRateLimiter,
    rerr_limiter: ControlRateLimiter,

    // === Timers ===
    /// Pending timer per event.
    pending_timers: HashMap<TimerEvent, TimerId>,
    /// Last time an RREQ or CPDA query was broadcast since the previous
    /// hello tick.
    last_broadcast_ms: Option<u64>,

    // === CPDA ===
    /// Keys we selected at start.
    keys: Vec<u16>,
    /// Keys advertised by neighbors.
    key_map: KeyMap,
    cluster: ClusterState,

    // === Link Failures ===
    /// Neighbors a unicast send failed to, handled after the current event.
    failed_links: Vec<Ipv4Addr>,
}

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Create a node with a randomly seeded generator.
    pub fn new(config: Config, transport: T, timers: S) -> Result<Self, NodeError> {
        Self::with_rng(config, transport, timers, StdRng::from_entropy())
    }

    /// Create a node with an explicit random generator.
    pub fn with_rng(config: Config, transport: T, timers: S, rng: StdRng) -> Result<Self, NodeError> {
        config.validate()?;

        let now_ms = timers.now_ms();
        let aodv = &config.aodv;
        let path_discovery_ms = aodv.path_discovery_time_ms();

        Ok(Self {
            queue: RequestQueue::new(aodv.max_queue_len(), aodv.max_queue_time_ms()),
            rreq_ids: IdCache::new(path_discovery_ms),
            query_ids: IdCache::new(path_discovery_ms),
            dpd: DuplicatePacketDetection::new(path_discovery_ms),
            rreq_limiter: ControlRateLimiter::new(aodv.rreq_rate_limit(), now_ms),
            rerr_limiter: ControlRateLimiter::new(aodv.rerr_rate_limit(), now_ms),
            config,
            state: NodeState::Created,
            transport,
            timers,
            rng,
            interfaces: BTreeMap::new(),
            routes: RoutingTable::new(),
            neighbors: Neighbors::new(),
            seqno: 0,
            request_id: 0,
            query_id: 0,
            pending_timers: HashMap::new(),
            last_broadcast_ms: None,
            keys: Vec::new(),
            key_map: KeyMap::new(),
            cluster: ClusterState::new(),
            failed_links: Vec::new(),
        })
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_operational()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.values()
    }

    /// Address of the first interface, used as the node's identity.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.interfaces.values().next().map(|i| i.local)
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.routes
    }

    /// Printable routing table snapshot.
    pub fn routing_table_dump(&self) -> RoutingTableDump<'_> {
        self.routes.dump(self.now_ms())
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Own destination sequence number.
    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    /// Keys selected by this node.
    pub fn keys(&self) -> &[u16] {
        &self.keys
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    pub fn cluster(&self) -> &ClusterState {
        &self.cluster
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.timers
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.timers
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Whether a timer for `event` is pending.
    pub fn is_timer_pending(&self, event: &TimerEvent) -> bool {
        self.pending_timers.contains_key(event)
    }

    // === Address Helpers ===

    pub(in crate::node) fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    pub(in crate::node) fn is_local_address(&self, addr: &Ipv4Addr) -> bool {
        self.interfaces.values().any(|i| i.local == *addr)
    }

    pub(in crate::node) fn is_broadcast_address(&self, addr: &Ipv4Addr) -> bool {
        addr.is_broadcast() || self.interfaces.values().any(|i| i.broadcast == *addr)
    }

    pub(in crate::node) fn local_address(&self, interface: InterfaceId) -> Option<Ipv4Addr> {
        self.interfaces.get(&interface).map(|i| i.local)
    }

    /// Forwarding decision for a usable routing entry.
    pub(in crate::node) fn route_for(&self, entry: &RouteEntry) -> Option<Route> {
        let source = self.local_address(entry.interface())?;
        Some(Route {
            destination: entry.destination(),
            source,
            gateway: entry.next_hop(),
            interface: entry.interface(),
        })
    }

    // === Timer Helpers ===

    /// Schedule `event`, replacing any pending timer for the same event.
    pub(in crate::node) fn schedule_timer(&mut self, delay_ms: u64, event: TimerEvent) {
        if let Some(old) = self.pending_timers.remove(&event) {
            self.timers.cancel(old);
        }
        let id = self.timers.schedule(delay_ms, event);
        self.pending_timers.insert(event, id);
    }

    /// Cancel the pending timer for `event`, if any.
    pub(in crate::node) fn cancel_timer(&mut self, event: &TimerEvent) -> bool {
        match self.pending_timers.remove(event) {
            Some(id) => self.timers.cancel(id),
            None => false,
        }
    }

    pub(in crate::node) fn cancel_all_timers(&mut self) {
        for (_, id) in self.pending_timers.drain() {
            self.timers.cancel(id);
        }
    }

    // === Route Helpers ===

    /// Extend a usable route's lifetime. Returns whether the route exists.
    pub(in crate::node) fn update_route_lifetime(&mut self, dst: &Ipv4Addr, lifetime_ms: u64) -> bool {
        let now_ms = self.now_ms();
        self.routes.update_lifetime_if_greater(dst, lifetime_ms, now_ms)
    }

    /// Install or refresh the one-hop route to the sender of a control
    /// packet.
    ///
    /// A new route carries no valid sequence number and is marked as not
    /// having carried data yet.
    pub(in crate::node) fn update_route_to_neighbor(&mut self, sender: Ipv4Addr, interface: InterfaceId) {
        let now_ms = self.now_ms();
        let active_ms = self.config.aodv.active_route_timeout_ms();

        match self.routes.lookup_mut(&sender) {
            Some(entry)
                if entry.valid_seqno()
                    && entry.is_usable()
                    && entry.hop_count() == 1
                    && entry.next_hop() == sender =>
            {
                entry.extend_lifetime(active_ms, now_ms);
            }
            Some(entry) => {
                let lifetime_ms = entry.lifetime_ms(now_ms).max(active_ms);
                let state = if entry.state() == RouteState::Valid {
                    RouteState::Valid
                } else {
                    RouteState::ValidNoData
                };
                entry.set_valid_seqno(false);
                entry.set_seqno(0);
                entry.set_next_hop(sender);
                entry.set_interface(interface);
                entry.set_hop_count(1);
                entry.set_state(state);
                entry.reset_rreq_count();
                entry.set_lifetime(lifetime_ms, now_ms);
            }
            None => {
                let mut entry =
                    RouteEntry::new(sender, false, 0, interface, 1, sender, active_ms, now_ms);
                entry.set_state(RouteState::ValidNoData);
                self.routes.upsert(entry);
                trace!(neighbor = %sender, iface = %interface, "Installed neighbor route");
            }
        }
    }

    // === Send Helpers ===

    /// Encode and send a control message out of one interface.
    ///
    /// A unicast send that fails with a link failure is recorded against
    /// the destination and handled once the current event completes.
    /// Local errors such as a full send queue only drop the message.
    pub(in crate::node) fn send_message<M: WireMessage>(
        &mut self,
        interface: InterfaceId,
        destination: Ipv4Addr,
        ttl: u8,
        msg: &M,
    ) -> bool {
        trace!(
            iface = %interface,
            dst = %destination,
            ttl,
            msg_type = %M::MESSAGE_TYPE,
            msg = %msg,
            "Sending control message"
        );

        let datagram = OutboundDatagram {
            interface,
            destination,
            ttl,
            payload: msg.encode(),
        };

        match self.transport.send(datagram) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    iface = %interface,
                    dst = %destination,
                    msg_type = %M::MESSAGE_TYPE,
                    error = %e,
                    "Failed to send control message"
                );
                if e.is_link_failure()
                    && !self.is_broadcast_address(&destination)
                    && !self.failed_links.contains(&destination)
                {
                    self.failed_links.push(destination);
                }
                false
            }
        }
    }

    /// Send a message built per interface to every interface's broadcast
    /// address. Returns how many sends succeeded.
    pub(in crate::node) fn broadcast_message<M: WireMessage>(
        &mut self,
        ttl: u8,
        mut build: impl FnMut(&Interface) -> M,
    ) -> usize {
        let interfaces: Vec<Interface> = self.interfaces.values().copied().collect();
        let mut sent = 0;
        for iface in interfaces {
            let msg = build(&iface);
            if self.send_message(iface.id, iface.broadcast, ttl, &msg) {
                sent += 1;
            }
        }
        sent
    }

    /// Handle link failures recorded while processing the last event.
    pub(in crate::node) fn drain_link_failures(&mut self) {
        while let Some(neighbor) = self.failed_links.pop() {
            debug!(neighbor = %neighbor, "Handling link failure from failed send");
            self.handle_link_failure(neighbor);
        }
    }
}

impl<T: Transport, S: Scheduler> fmt::Debug for Node<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.primary_address())
            .field("state", &self.state)
            .field("seqno", &self.seqno)
            .field("routes", &self.routes.len())
            .field("neighbors", &self.neighbors.len())
            .field("queued", &self.queue.len())
            .field("cluster", self.cluster.role())
            .finish()
    }
}
