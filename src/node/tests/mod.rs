//! Node engine tests.
//!
//! Single-node tests feed hand-built control messages into one node and
//! inspect what it sent. Multi-node tests wire several nodes together with
//! [`Network`], which carries datagrams between linked nodes and advances
//! every clock in lockstep.

use super::*;
use crate::packet::{DataPacket, DeliverFn, ErrorFn, ForwardError, ForwardFn, Route};
use crate::protocol::{
    CpdaJoin, CpdaKey, CpdaQuery, Message, RouteError, RouteReply, RouteReplyAck, RouteRequest,
};
use crate::transport::test_impls::MockTransport;
use crate::transport::InboundDatagram;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

mod cpda;
mod hello;
mod request;

pub(super) type TestNode = Node<MockTransport, TimerQueue>;

pub(super) const IFACE: InterfaceId = InterfaceId(0);
pub(super) const BROADCAST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 255);

pub(super) fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// No hellos and no CPDA: a node only sends what a test provokes.
pub(super) fn quiet_config() -> Config {
    let mut config = Config::new();
    config.aodv.enable_hello = Some(false);
    config.cpda.enabled = Some(false);
    config
}

/// A started node at 10.0.0.`last` on a single interface.
pub(super) fn make_node_with(last: u8, config: Config) -> TestNode {
    let mut node = Node::with_rng(
        config,
        MockTransport::new(),
        TimerQueue::new(),
        StdRng::seed_from_u64(last as u64),
    )
    .unwrap();
    node.add_interface(Interface::new(IFACE, addr(last), BROADCAST))
        .unwrap();
    node.start().unwrap();
    node
}

pub(super) fn make_node(last: u8) -> TestNode {
    make_node_with(last, quiet_config())
}

/// Feed `msg` to `node` as if `from` had sent it.
pub(super) fn deliver(node: &mut TestNode, from: Ipv4Addr, ttl: Option<u8>, msg: Message) {
    node.receive(InboundDatagram {
        interface: IFACE,
        sender: from,
        ttl,
        payload: msg.encode(),
    });
}

/// Everything the node sent since the last call, decoded.
pub(super) fn sent(node: &mut TestNode) -> Vec<(OutboundDatagram, Message)> {
    node.transport_mut()
        .take_sent()
        .into_iter()
        .map(|d| {
            let msg = Message::decode(&d.payload).unwrap();
            (d, msg)
        })
        .collect()
}

/// Advance the node's clock by `ms`, firing each timer at its deadline.
pub(super) fn advance(node: &mut TestNode, ms: u64) {
    let target = node.scheduler().now_ms() + ms;
    while let Some(deadline) = node.next_deadline() {
        if deadline > target {
            break;
        }
        node.scheduler_mut().set_now(deadline);
        node.process_timers();
    }
    node.scheduler_mut().set_now(target);
    node.process_timers();
}

pub(super) fn now(node: &TestNode) -> u64 {
    node.scheduler().now_ms()
}

// ============================================================================
// Packet Outcomes
// ============================================================================

/// Records what the engine did with data packets.
#[derive(Clone, Default)]
pub(super) struct Outcomes {
    routed: Rc<RefCell<Vec<(Route, DataPacket)>>>,
    failed: Rc<RefCell<Vec<(DataPacket, ForwardError)>>>,
    delivered: Rc<RefCell<Vec<DataPacket>>>,
}

impl Outcomes {
    pub(super) fn on_route(&self) -> ForwardFn {
        let routed = self.routed.clone();
        Box::new(move |route, packet| routed.borrow_mut().push((route, packet)))
    }

    pub(super) fn on_error(&self) -> ErrorFn {
        let failed = self.failed.clone();
        Box::new(move |packet, error| failed.borrow_mut().push((packet, error)))
    }

    pub(super) fn on_local(&self) -> DeliverFn {
        let delivered = self.delivered.clone();
        Box::new(move |packet, _| delivered.borrow_mut().push(packet))
    }

    pub(super) fn routed(&self) -> Vec<(Route, DataPacket)> {
        self.routed.borrow().clone()
    }

    pub(super) fn failed(&self) -> Vec<(DataPacket, ForwardError)> {
        self.failed.borrow().clone()
    }

    pub(super) fn delivered(&self) -> Vec<DataPacket> {
        self.delivered.borrow().clone()
    }
}

// ============================================================================
// Multi-node Harness
// ============================================================================

/// Nodes on one broadcast segment, with explicit pairwise links deciding
/// who hears whom.
pub(super) struct Network {
    pub(super) nodes: Vec<TestNode>,
    links: BTreeSet<(usize, usize)>,
    now_ms: u64,
}

impl Network {
    pub(super) fn new(nodes: Vec<TestNode>) -> Self {
        Self {
            nodes,
            links: BTreeSet::new(),
            now_ms: 0,
        }
    }

    pub(super) fn link(&mut self, a: usize, b: usize) {
        self.links.insert((a.min(b), a.max(b)));
    }

    fn linked(&self, a: usize, b: usize) -> bool {
        self.links.contains(&(a.min(b), a.max(b)))
    }

    fn index_of(&self, address: Ipv4Addr) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.primary_address() == Some(address))
    }

    /// Carry datagrams between linked nodes until nobody has anything
    /// left to send.
    pub(super) fn flush(&mut self) {
        for _ in 0..10_000 {
            let mut outbox = Vec::new();
            for (i, node) in self.nodes.iter_mut().enumerate() {
                for datagram in node.transport_mut().take_sent() {
                    outbox.push((i, datagram));
                }
            }
            if outbox.is_empty() {
                return;
            }

            for (from, datagram) in outbox {
                let sender = self.nodes[from].primary_address().unwrap();
                let targets: Vec<usize> = if datagram.destination == BROADCAST
                    || datagram.destination.is_broadcast()
                {
                    (0..self.nodes.len())
                        .filter(|&j| j != from && self.linked(from, j))
                        .collect()
                } else {
                    self.index_of(datagram.destination)
                        .filter(|&j| self.linked(from, j))
                        .into_iter()
                        .collect()
                };

                for j in targets {
                    self.nodes[j].receive(InboundDatagram {
                        interface: IFACE,
                        sender,
                        ttl: Some(datagram.ttl),
                        payload: datagram.payload.clone(),
                    });
                }
            }
        }
        panic!("network did not settle");
    }

    /// Advance every clock by `ms`, delivering traffic as timers fire.
    pub(super) fn run_for(&mut self, ms: u64) {
        let end = self.now_ms + ms;
        self.flush();
        loop {
            let next = self.nodes.iter().filter_map(|n| n.next_deadline()).min();
            match next {
                Some(deadline) if deadline <= end => self.step_to(deadline),
                _ => break,
            }
        }
        self.step_to(end);
    }

    fn step_to(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        for node in &mut self.nodes {
            node.scheduler_mut().set_now(now_ms);
            node.process_timers();
        }
        self.flush();
    }
}
