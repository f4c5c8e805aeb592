//! RREQ processing tests: duplicate suppression, reverse routes, replies
//! from the destination and from intermediate nodes, RREP-ACK handling.

use super::*;

fn rreq(id: u32, origin: Ipv4Addr, origin_seqno: u32, dst: Ipv4Addr) -> RouteRequest {
    let mut rreq = RouteRequest::new(0, id, dst, 0, origin, origin_seqno);
    rreq.set_unknown_seqno(true);
    rreq
}

fn hello(from: Ipv4Addr, seqno: u32) -> Message {
    Message::RouteReply(RouteReply::hello(from, seqno, 2000))
}

#[test]
fn test_rreq_rebroadcast_once() {
    let mut node = make_node(2);
    let request = rreq(7, addr(1), 3, addr(9));

    deliver(&mut node, addr(1), Some(5), Message::RouteRequest(request.clone()));
    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.destination, BROADCAST);
    assert_eq!(out[0].0.ttl, 4);
    let Message::RouteRequest(forwarded) = &out[0].1 else {
        panic!("expected RREQ");
    };
    assert_eq!(forwarded.hop_count, 1);
    assert_eq!(forwarded.origin, addr(1));

    // Same (originator, id) again, even via another neighbor.
    deliver(&mut node, addr(3), Some(5), Message::RouteRequest(request));
    assert!(sent(&mut node).is_empty());
}

#[test]
fn test_rreq_installs_reverse_route() {
    let mut node = make_node(2);
    let mut request = rreq(7, addr(1), 3, addr(9));
    request.hop_count = 2;

    deliver(&mut node, addr(4), Some(5), Message::RouteRequest(request));

    let entry = node.routing_table().lookup_valid(&addr(1)).unwrap();
    assert_eq!(entry.next_hop(), addr(4));
    assert_eq!(entry.hop_count(), 3);
    assert_eq!(entry.seqno(), 3);
    assert!(entry.valid_seqno());
    assert_eq!(entry.state(), RouteState::ValidNoData);
}

#[test]
fn test_rreq_ttl_exhausted_not_rebroadcast() {
    let mut node = make_node(2);
    deliver(
        &mut node,
        addr(1),
        Some(1),
        Message::RouteRequest(rreq(1, addr(1), 1, addr(9))),
    );
    assert!(sent(&mut node).is_empty());
    // The reverse route is still learned.
    assert!(node.routing_table().lookup_valid(&addr(1)).is_some());
}

#[test]
fn test_destination_replies() {
    let mut node = make_node(3);
    let mut request = RouteRequest::new(1, 4, addr(3), 1, addr(1), 9);
    request.set_unknown_seqno(false);

    deliver(&mut node, addr(2), Some(34), Message::RouteRequest(request));

    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    let (datagram, msg) = &out[0];
    assert_eq!(datagram.destination, addr(2));
    assert_eq!(datagram.ttl, 2);
    let Message::RouteReply(rrep) = msg else {
        panic!("expected RREP");
    };
    assert_eq!(rrep.dst, addr(3));
    assert_eq!(rrep.origin, addr(1));
    assert_eq!(rrep.hop_count, 0);
    // Asked for exactly our next sequence number.
    assert_eq!(rrep.dst_seqno, 1);
    assert_eq!(node.seqno(), 1);
    assert_eq!(
        rrep.lifetime_ms as u64,
        node.config().aodv.my_route_timeout_ms()
    );
}

#[test]
fn test_sender_on_path_to_destination_is_not_answered() {
    let mut node = make_node(2);
    // Route to 6 through 4.
    deliver(
        &mut node,
        addr(4),
        Some(1),
        Message::RouteReply(RouteReply::new(0, 0, addr(6), 3, addr(9), 10_000)),
    );
    assert_eq!(
        node.routing_table().lookup_valid(&addr(6)).unwrap().next_hop(),
        addr(4)
    );
    sent(&mut node);

    deliver(
        &mut node,
        addr(4),
        Some(10),
        Message::RouteRequest(rreq(1, addr(5), 1, addr(6))),
    );
    assert!(sent(&mut node).is_empty());
}

// ============================================================================
// Intermediate Replies
// ============================================================================

#[test]
fn test_intermediate_reply_with_gratuitous_rrep() {
    let mut node = make_node(2);
    deliver(&mut node, addr(4), Some(1), hello(addr(4), 6));

    let mut request = rreq(1, addr(1), 2, addr(4));
    request.set_gratuitous_rrep(true);
    deliver(&mut node, addr(1), Some(10), Message::RouteRequest(request));

    let out = sent(&mut node);
    assert_eq!(out.len(), 2);

    let (to_origin, msg) = &out[0];
    assert_eq!(to_origin.destination, addr(1));
    let Message::RouteReply(rrep) = msg else {
        panic!("expected RREP");
    };
    assert_eq!(rrep.dst, addr(4));
    assert_eq!(rrep.dst_seqno, 6);
    assert_eq!(rrep.origin, addr(1));
    assert_eq!(rrep.hop_count, 1);
    assert!(rrep.ack_required());

    let (to_dst, msg) = &out[1];
    assert_eq!(to_dst.destination, addr(4));
    let Message::RouteReply(gratuitous) = msg else {
        panic!("expected gratuitous RREP");
    };
    assert_eq!(gratuitous.dst, addr(1));
    assert_eq!(gratuitous.origin, addr(4));
    assert_eq!(gratuitous.dst_seqno, 2);

    let table = node.routing_table();
    assert!(table.precursors(&addr(4)).contains(&addr(1)));
    assert!(table.precursors(&addr(1)).contains(&addr(4)));
    assert!(node.is_timer_pending(&TimerEvent::AckTimeout(addr(1))));
}

#[test]
fn test_destination_only_flag_forces_rebroadcast() {
    let mut node = make_node(2);
    deliver(&mut node, addr(4), Some(1), hello(addr(4), 6));

    let mut request = rreq(1, addr(1), 2, addr(4));
    request.set_destination_only(true);
    deliver(&mut node, addr(1), Some(10), Message::RouteRequest(request));

    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.destination, BROADCAST);
    let Message::RouteRequest(forwarded) = &out[0].1 else {
        panic!("expected RREQ");
    };
    assert_eq!(forwarded.dst_seqno, 6);
    assert!(!forwarded.unknown_seqno());
}

#[test]
fn test_stale_route_not_used_for_reply() {
    let mut node = make_node(2);
    deliver(&mut node, addr(4), Some(1), hello(addr(4), 6));

    let mut request = RouteRequest::new(0, 1, addr(4), 8, addr(1), 2);
    request.set_unknown_seqno(false);
    deliver(&mut node, addr(1), Some(10), Message::RouteRequest(request));

    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert!(matches!(&out[0].1, Message::RouteRequest(r) if r.dst_seqno == 8));
}

// ============================================================================
// RREP-ACK
// ============================================================================

fn node_awaiting_ack() -> TestNode {
    let mut node = make_node(2);
    deliver(&mut node, addr(4), Some(1), hello(addr(4), 6));
    deliver(
        &mut node,
        addr(1),
        Some(10),
        Message::RouteRequest(rreq(1, addr(1), 2, addr(4))),
    );
    sent(&mut node);
    assert!(node.is_timer_pending(&TimerEvent::AckTimeout(addr(1))));
    node
}

#[test]
fn test_missing_ack_blacklists_neighbor() {
    let mut node = node_awaiting_ack();

    let wait_ms = node.config().aodv.next_hop_wait_ms();
    advance(&mut node, wait_ms);
    assert!(node.neighbors().is_blacklisted(&addr(1), now(&node)));

    // RREQs from a blacklisted neighbor are ignored.
    deliver(
        &mut node,
        addr(1),
        Some(10),
        Message::RouteRequest(rreq(2, addr(1), 3, addr(9))),
    );
    assert!(sent(&mut node).is_empty());

    let blacklist_ms = node.config().aodv.blacklist_timeout_ms();
    advance(&mut node, blacklist_ms);
    assert!(!node.neighbors().is_blacklisted(&addr(1), now(&node)));
}

#[test]
fn test_ack_cancels_timeout() {
    let mut node = node_awaiting_ack();

    deliver(
        &mut node,
        addr(1),
        Some(1),
        Message::RouteReplyAck(RouteReplyAck::new()),
    );
    assert!(!node.is_timer_pending(&TimerEvent::AckTimeout(addr(1))));
    assert_eq!(
        node.routing_table().lookup(&addr(1)).unwrap().state(),
        RouteState::Valid
    );

    advance(&mut node, 200);
    assert!(!node.neighbors().is_blacklisted(&addr(1), now(&node)));
}
