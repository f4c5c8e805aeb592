//! CPDA clustering tests: key exchange, query flooding and the join
//! handshake.

use super::*;

/// CPDA on, hellos off. With a single key in the pool every pair of nodes
/// shares a key.
fn cpda_config(query_node: bool) -> Config {
    let mut config = quiet_config();
    config.cpda.enabled = Some(true);
    config.cpda.enable_query_node = Some(query_node);
    config.cpda.key_total = Some(1);
    config.cpda.key_selection = Some(1);
    config
}

fn cpda_node(last: u8, query_node: bool) -> TestNode {
    make_node_with(last, cpda_config(query_node))
}

#[test]
fn test_keys_advertised_after_start() {
    let mut node = cpda_node(1, false);
    assert_eq!(node.keys(), &[1]);

    advance(&mut node, 100);
    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].0.destination, BROADCAST);
    assert_eq!(out[0].0.ttl, 1);
    let Message::CpdaKey(advertisement) = &out[0].1 else {
        panic!("expected key advertisement");
    };
    assert_eq!(advertisement.origin(), addr(1));
    assert_eq!(advertisement.keys(), &[1]);
}

#[test]
fn test_neighbor_keys_stored() {
    let mut node = cpda_node(2, false);
    let advertisement = CpdaKey::new(addr(1), 0, 2000, vec![4, 9]).unwrap();

    deliver(&mut node, addr(1), Some(1), Message::CpdaKey(advertisement));

    assert_eq!(node.key_map().keys_of(&addr(1)), Some(&[4, 9][..]));
}

#[test]
fn test_star_cluster_forms_around_root() {
    // B(2) - A(1) - C(3), A floods the query.
    let mut net = Network::new(vec![
        cpda_node(1, true),
        cpda_node(2, false),
        cpda_node(3, false),
    ]);
    net.link(0, 1);
    net.link(0, 2);
    net.run_for(3000);

    let a = &net.nodes[0];
    assert!(a.cluster().is_leader());
    let members = a.cluster().members().unwrap();
    assert_eq!(members.get(&addr(2)), Some(&1));
    assert_eq!(members.get(&addr(3)), Some(&1));
    assert!(a.key_map().keys_of(&addr(2)).is_some());
    assert!(a.key_map().keys_of(&addr(3)).is_some());

    for member in &net.nodes[1..] {
        assert!(member.cluster().is_member());
        assert_eq!(member.cluster().leader(), Some(addr(1)));
        assert!(!member.is_timer_pending(&TimerEvent::JoinTimeout(addr(1))));
        // The query also left a route back to the root.
        assert!(member.routing_table().lookup_valid(&addr(1)).is_some());
    }
}

#[test]
fn test_member_refuses_to_lead() {
    // A(1) - B(2) - C(3): C hears the query from B, which has already
    // joined A.
    let mut net = Network::new(vec![
        cpda_node(1, true),
        cpda_node(2, false),
        cpda_node(3, false),
    ]);
    net.link(0, 1);
    net.link(1, 2);
    net.run_for(4000);

    let a = &net.nodes[0];
    let members = a.cluster().members().unwrap();
    assert_eq!(members.len(), 1);
    assert!(members.contains_key(&addr(2)));

    assert_eq!(net.nodes[1].cluster().leader(), Some(addr(1)));

    let c = &net.nodes[2];
    assert!(!c.cluster().is_clustered());
    assert_eq!(c.cluster().pending_leader(), None);
}

#[test]
fn test_query_without_shared_key_only_forwarded() {
    let mut config = cpda_config(false);
    config.cpda.key_total = Some(100);
    config.cpda.key_selection = Some(10);
    let mut node = make_node_with(2, config);

    let theirs: Vec<u16> = (1..=100u16)
        .filter(|k| !node.keys().contains(k))
        .take(10)
        .collect();
    deliver(
        &mut node,
        addr(1),
        Some(1),
        Message::CpdaKey(CpdaKey::new(addr(1), 0, 2000, theirs).unwrap()),
    );
    sent(&mut node);

    deliver(
        &mut node,
        addr(1),
        Some(35),
        Message::CpdaQuery(CpdaQuery::new(addr(1), 1, 0, 5600)),
    );

    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    let Message::CpdaQuery(forwarded) = &out[0].1 else {
        panic!("expected forwarded query");
    };
    assert_eq!(forwarded.hop_count(), 1);
    assert_eq!(out[0].0.ttl, 34);
    assert!(!node.cluster().is_clustered());
    assert_eq!(node.cluster().pending_leader(), None);
}

#[test]
fn test_duplicate_query_ignored() {
    let mut node = cpda_node(2, false);
    let query = CpdaQuery::new(addr(1), 1, 0, 5600);

    deliver(&mut node, addr(1), Some(35), Message::CpdaQuery(query.clone()));
    sent(&mut node);
    deliver(&mut node, addr(3), Some(35), Message::CpdaQuery(query));
    assert!(sent(&mut node).is_empty());
}

#[test]
fn test_join_request_with_foreign_key_rejected() {
    let mut config = cpda_config(false);
    config.cpda.key_total = Some(100);
    config.cpda.key_selection = Some(10);
    let mut node = make_node_with(1, config);
    let foreign = (1..=100u16)
        .find(|k| !node.keys().contains(k))
        .unwrap();

    deliver(
        &mut node,
        addr(2),
        Some(1),
        Message::CpdaJoin(CpdaJoin::request(addr(1), addr(2), foreign, 1000)),
    );

    assert!(sent(&mut node).is_empty());
    assert!(!node.cluster().is_leader());
}

#[test]
fn test_unanswered_join_times_out() {
    let mut node = cpda_node(2, false);
    deliver(
        &mut node,
        addr(1),
        Some(1),
        Message::CpdaKey(CpdaKey::new(addr(1), 0, 2000, vec![1]).unwrap()),
    );
    deliver(
        &mut node,
        addr(1),
        Some(1),
        Message::CpdaQuery(CpdaQuery::new(addr(1), 1, 0, 5600)),
    );

    let joins: Vec<CpdaJoin> = sent(&mut node)
        .into_iter()
        .filter_map(|(_, msg)| match msg {
            Message::CpdaJoin(join) => Some(join),
            _ => None,
        })
        .collect();
    assert_eq!(joins.len(), 1);
    assert!(joins[0].is_request());
    assert_eq!(joins[0].leader(), addr(1));
    assert_eq!(joins[0].joiner(), addr(2));
    assert_eq!(node.cluster().pending_leader(), Some(addr(1)));

    advance(&mut node, 1000);
    assert_eq!(node.cluster().pending_leader(), None);
    assert!(!node.cluster().is_clustered());
}
