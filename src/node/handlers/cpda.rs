//! CPDA key advertisement, cluster query and join handshake.

use super::request::wire_lifetime;
use super::{Received, relay_ttl};
use crate::node::Node;
use crate::protocol::{CpdaJoin, CpdaKey, CpdaQuery};
use crate::routing::{RouteEntry, RouteState};
use crate::timer::{Scheduler, TimerEvent};
use crate::transport::{Interface, Transport};
use std::net::Ipv4Addr;
use tracing::{debug, info, trace, warn};

impl<T: Transport, S: Scheduler> Node<T, S> {
    /// Advertise our keys to one-hop neighbors.
    pub(in crate::node) fn send_key(&mut self) {
        if self.keys.is_empty() {
            debug!("No CPDA keys selected, skipping advertisement");
            return;
        }

        let seqno = self.seqno;
        let lifetime = wire_lifetime(self.config.aodv.hello_lifetime_ms());
        let interfaces: Vec<Interface> = self.interfaces.values().copied().collect();

        for iface in interfaces {
            let advertisement = match CpdaKey::new(iface.local, seqno, lifetime, self.keys.clone()) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!(error = %e, "Cannot build CPDA key advertisement");
                    return;
                }
            };
            self.send_message(iface.id, iface.broadcast, 1, &advertisement);
        }

        info!(keys = self.keys.len(), "Advertised CPDA keys");
    }

    /// Store the key set a neighbor advertised.
    pub(in crate::node) fn handle_cpda_key(&mut self, rx: Received, advertisement: CpdaKey) {
        if advertisement.origin() != rx.sender {
            debug!(
                from = %rx.sender,
                origin = %advertisement.origin(),
                "CPDA key advertisement origin differs from sender"
            );
        }

        let keys = advertisement.keys().to_vec();
        debug!(from = %rx.sender, keys = keys.len(), "Stored neighbor CPDA keys");
        self.key_map.insert(rx.sender, keys);
    }

    /// Flood the cluster query from this node as root.
    pub(in crate::node) fn send_query(&mut self) {
        let now_ms = self.now_ms();
        self.query_id = self.query_id.wrapping_add(1);
        let query_id = self.query_id;

        let locals: Vec<Ipv4Addr> = self.interfaces.values().map(|i| i.local).collect();
        for local in locals {
            self.query_ids.is_duplicate(local, query_id, now_ms);
        }

        let lifetime = wire_lifetime(self.config.aodv.path_discovery_time_ms());
        let ttl = self.config.aodv.net_diameter();

        info!(query_id, "Flooding CPDA cluster query");
        self.broadcast_message(ttl, |iface| CpdaQuery::new(iface.local, query_id, 0, lifetime));
        self.last_broadcast_ms = Some(now_ms);
    }

    /// Handle a flooded cluster query.
    ///
    /// Processing steps:
    /// 1. Ignore our own and already seen queries
    /// 2. Increment the hop count and install a route back to the root
    /// 3. If unclustered, ask the sender to take us in when we share a key
    /// 4. Rebroadcast while within the network diameter
    pub(in crate::node) fn handle_cpda_query(&mut self, rx: Received, query: CpdaQuery) {
        let now_ms = self.now_ms();
        let root = query.root();
        let query_id = query.query_id();

        if self.is_local_address(&root) {
            trace!(from = %rx.sender, query_id, "Our own query came back");
            return;
        }
        if self.query_ids.is_duplicate(root, query_id, now_ms) {
            trace!(from = %rx.sender, root = %root, query_id, "Duplicate CPDA query");
            return;
        }

        let hop_count = query.hop_count().saturating_add(1);
        debug!(from = %rx.sender, root = %root, query_id, hops = hop_count, "Received CPDA query");

        self.update_route_to_root(root, rx, hop_count);

        if !self.cluster.is_clustered() && self.cluster.pending_leader().is_none() {
            match self.key_map.match_with(&self.keys, &rx.sender) {
                Some(key) => self.send_join_request(rx, key),
                None => debug!(from = %rx.sender, "No key shared with query sender"),
            }
        }

        let Some(ttl) = relay_ttl(rx.ttl, hop_count, self.config.aodv.net_diameter()) else {
            trace!(root = %root, query_id, "CPDA query reached its TTL, not rebroadcasting");
            return;
        };

        let forwarded = CpdaQuery::new(root, query_id, hop_count, query.header.lifetime_ms);
        self.broadcast_message(ttl, |_| forwarded.clone());
        self.last_broadcast_ms = Some(now_ms);
    }

    /// Route back to the query root through the neighbor we heard it from.
    ///
    /// A usable route is only kept alive; anything else is replaced.
    fn update_route_to_root(&mut self, root: Ipv4Addr, rx: Received, hop_count: u8) {
        let now_ms = self.now_ms();
        let aodv = &self.config.aodv;
        let lifetime_ms = (2 * aodv.net_traversal_time_ms())
            .saturating_sub(2 * hop_count as u64 * aodv.node_traversal_time_ms());

        match self.routes.lookup_mut(&root) {
            Some(entry) if entry.is_usable() => {
                entry.extend_lifetime(lifetime_ms, now_ms);
            }
            Some(entry) => {
                entry.set_next_hop(rx.sender);
                entry.set_interface(rx.interface);
                entry.set_hop_count(hop_count);
                entry.set_state(RouteState::ValidNoData);
                entry.reset_rreq_count();
                entry.set_lifetime(lifetime_ms, now_ms);
            }
            None => {
                let mut entry =
                    RouteEntry::new(root, false, 0, rx.interface, hop_count, rx.sender, lifetime_ms, now_ms);
                entry.set_state(RouteState::ValidNoData);
                self.routes.upsert(entry);
            }
        }

        if self.queue.has(&root) {
            self.send_packets_from_queue(root);
        }
    }

    /// Ask the neighbor `rx.sender` to accept us into its cluster.
    fn send_join_request(&mut self, rx: Received, key: u16) {
        let Some(local) = self.local_address(rx.interface) else {
            return;
        };
        if !self.cluster.begin_join(rx.sender, key) {
            return;
        }

        let timeout_ms = self.config.cpda.join_timeout_ms();
        let join = CpdaJoin::request(rx.sender, local, key, wire_lifetime(timeout_ms));

        info!(leader = %rx.sender, key, "Requesting to join cluster");
        self.send_message(rx.interface, rx.sender, 1, &join);
        self.schedule_timer(timeout_ms, TimerEvent::JoinTimeout(rx.sender));
    }

    /// Handle a join request or confirmation.
    ///
    /// A request for one of our own keys makes us (or keeps us) leader
    /// unless we are a member ourselves; it is answered with a
    /// confirmation. A confirmation completes our pending join.
    pub(in crate::node) fn handle_cpda_join(&mut self, rx: Received, join: CpdaJoin) {
        if join.is_request() {
            self.handle_join_request(rx, join);
            return;
        }

        if !self.is_local_address(&join.joiner()) {
            debug!(from = %rx.sender, joiner = %join.joiner(), "Join confirmation for another node");
            return;
        }

        let leader = join.leader();
        if self.cluster.confirm_join(leader) {
            self.cancel_timer(&TimerEvent::JoinTimeout(leader));
            info!(leader = %leader, key = ?join.key(), "Joined cluster");
        } else {
            debug!(from = %rx.sender, leader = %leader, "Ignoring unexpected join confirmation");
        }
    }

    fn handle_join_request(&mut self, rx: Received, join: CpdaJoin) {
        if !self.is_local_address(&join.leader()) {
            debug!(from = %rx.sender, leader = %join.leader(), "Join request addressed to another node");
            return;
        }
        let Some(key) = join.key() else {
            debug!(from = %rx.sender, "Join request without a valid key");
            return;
        };
        if !self.keys.contains(&key) {
            debug!(from = %rx.sender, key, "Join request key is not one of ours");
            return;
        }

        let joiner = join.joiner();
        let pending = self.cluster.pending_leader();

        match self.cluster.accept_member(joiner, key) {
            Ok(added) => {
                if let Some(pending) = pending {
                    self.cancel_timer(&TimerEvent::JoinTimeout(pending));
                    debug!(leader = %pending, "Dropped own pending join on becoming leader");
                }
                if added {
                    info!(member = %joiner, key, "Accepted cluster member");
                } else {
                    debug!(member = %joiner, "Member asked again, confirming");
                }
                let confirm = CpdaJoin::confirm(join.leader(), joiner, key, join.header.lifetime_ms);
                self.send_message(rx.interface, rx.sender, 1, &confirm);
            }
            Err(e) => {
                debug!(from = %rx.sender, error = %e, "Rejecting join request");
            }
        }
    }

    /// A join request went unanswered.
    pub(in crate::node) fn handle_join_timeout(&mut self, leader: Ipv4Addr) {
        if self.cluster.join_timed_out(leader) {
            info!(leader = %leader, "Join request timed out, staying unclustered");
        }
    }
}
