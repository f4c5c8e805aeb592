//! Hello and neighbor liveness tests.

use super::*;

fn hello_config() -> Config {
    let mut config = quiet_config();
    config.aodv.enable_hello = Some(true);
    config
}

fn hellos(node: &mut TestNode) -> Vec<(OutboundDatagram, RouteReply)> {
    sent(node)
        .into_iter()
        .filter_map(|(d, msg)| match msg {
            Message::RouteReply(rrep) if rrep.is_hello() => Some((d, rrep)),
            _ => None,
        })
        .collect()
}

fn hello_from(last: u8) -> Message {
    Message::RouteReply(RouteReply::hello(addr(last), 1, 2000))
}

#[test]
fn test_hello_sent_every_interval() {
    let mut node = make_node_with(1, hello_config());

    advance(&mut node, 100);
    let first = hellos(&mut node);
    assert_eq!(first.len(), 1);
    let (datagram, hello) = &first[0];
    assert_eq!(datagram.destination, BROADCAST);
    assert_eq!(datagram.ttl, 1);
    assert_eq!(hello.dst, addr(1));
    assert_eq!(hello.hop_count, 0);
    assert_eq!(hello.lifetime_ms, 2000);

    advance(&mut node, 1000);
    assert_eq!(hellos(&mut node).len(), 1);
    advance(&mut node, 1000);
    assert_eq!(hellos(&mut node).len(), 1);
}

#[test]
fn test_hello_skipped_after_broadcast() {
    let mut config = hello_config();
    config.aodv.ttl_start = Some(35);
    let mut node = make_node_with(1, config);

    advance(&mut node, 100);
    assert_eq!(hellos(&mut node).len(), 1);

    // An RREQ at t=100 stands in for the next hello.
    let outcomes = Outcomes::default();
    node.route_output(
        DataPacket::new(addr(1), addr(9), 1, vec![]),
        outcomes.on_route(),
        None,
    )
    .unwrap();

    advance(&mut node, 999);
    assert!(hellos(&mut node).is_empty());

    // One interval after the RREQ.
    advance(&mut node, 1);
    assert_eq!(hellos(&mut node).len(), 1);
}

#[test]
fn test_hello_installs_neighbor_route() {
    let mut node = make_node_with(2, hello_config());
    deliver(&mut node, addr(1), Some(1), hello_from(1));

    let entry = node.routing_table().lookup_valid(&addr(1)).unwrap();
    assert_eq!(entry.hop_count(), 1);
    assert_eq!(entry.next_hop(), addr(1));
    assert_eq!(entry.seqno(), 1);
    assert!(entry.valid_seqno());
    assert_eq!(entry.state(), RouteState::ValidNoData);
    assert!(node.neighbors().is_neighbor(&addr(1), now(&node)));
}

#[test]
fn test_silent_neighbor_expires() {
    let mut node = make_node_with(2, hello_config());
    deliver(&mut node, addr(1), Some(1), hello_from(1));

    advance(&mut node, 2500);
    assert!(!node.neighbors().is_neighbor(&addr(1), now(&node)));
    assert_eq!(
        node.routing_table().lookup(&addr(1)).unwrap().state(),
        RouteState::Invalid
    );
}

#[test]
fn test_neighbor_expiry_reports_routes_through_it() {
    let mut node = make_node_with(2, hello_config());

    // C(3) is heard once; A(1) keeps saying hello.
    deliver(&mut node, addr(3), Some(1), hello_from(3));
    deliver(&mut node, addr(1), Some(1), hello_from(1));
    let mut rreq = RouteRequest::new(0, 1, addr(5), 0, addr(1), 1);
    rreq.set_unknown_seqno(true);
    deliver(&mut node, addr(1), Some(10), Message::RouteRequest(rreq));
    deliver(
        &mut node,
        addr(3),
        Some(10),
        Message::RouteReply(RouteReply::new(0, 0, addr(5), 9, addr(1), 10_000)),
    );
    sent(&mut node);

    let mut rerrs = Vec::new();
    for _ in 0..6 {
        deliver(&mut node, addr(1), Some(1), hello_from(1));
        advance(&mut node, 500);
        rerrs.extend(sent(&mut node).into_iter().filter_map(|(d, msg)| match msg {
            Message::RouteError(rerr) => Some((d, rerr)),
            _ => None,
        }));
    }

    assert_eq!(rerrs.len(), 1);
    let (datagram, rerr) = &rerrs[0];
    assert_eq!(datagram.destination, addr(1));
    assert!(rerr.unreachable().any(|(dst, seqno)| dst == addr(5) && seqno == 9));

    assert!(!node.neighbors().is_neighbor(&addr(3), now(&node)));
    assert!(node.neighbors().is_neighbor(&addr(1), now(&node)));
    assert_eq!(
        node.routing_table().lookup(&addr(5)).unwrap().state(),
        RouteState::Invalid
    );
}

#[test]
fn test_hello_flushes_packets_waiting_for_neighbor() {
    let mut node = make_node_with(1, hello_config());
    let outcomes = Outcomes::default();
    node.route_output(
        DataPacket::new(addr(1), addr(2), 1, vec![]),
        outcomes.on_route(),
        None,
    )
    .unwrap();
    assert!(outcomes.routed().is_empty());

    deliver(&mut node, addr(2), Some(1), hello_from(2));

    let routed = outcomes.routed();
    assert_eq!(routed.len(), 1);
    assert_eq!(routed[0].0.gateway, addr(2));
    assert!(!node.is_timer_pending(&TimerEvent::RreqRetry(addr(2))));
}
