//! Integration test: network membership over a world's lifetime.
//!
//! Wires are placed and cut, blocks are broken, chunks unload and reload.
//! After each step the manager's view must agree with the wire graph and
//! with the ids recorded on the nodes themselves.

use gridwire_core::id::{NetworkId, WireTier};
use gridwire_core::node::RateLimit;
use gridwire_core::store::NodeStore;
use gridwire_core::test_utils::*;
use gridwire_integration_tests::init_tracing;
use gridwire_power::{ConnectOutcome, ManagerConfig, NetworkEvent, NetworkManager, SplitDetection};

fn relays(count: i32) -> NodeStore {
    let mut nodes = NodeStore::new();
    for x in 0..count {
        spawn(&mut nodes, relay(x));
    }
    nodes
}

fn wire(m: &mut NetworkManager, nodes: &mut NodeStore, a: i32, b: i32) -> ConnectOutcome {
    m.on_wire_connected(nodes, point(a), point(b), WireTier(0))
        .expect("both ends are loaded")
}

fn stored_id(nodes: &NodeStore, x: i32) -> Option<NetworkId> {
    let key = nodes.key_at(point(x))?;
    nodes.get(key)?.electrical().network_id(0)
}

#[test]
fn wiring_into_an_existing_network_merges() {
    init_tracing();
    let mut nodes = relays(3);
    let mut m = NetworkManager::default();

    // a1 - a2 form network A; b1 stands alone in network B.
    let a = wire(&mut m, &mut nodes, 0, 1).network().unwrap();
    let b = m.create_network(&mut nodes, point(2)).unwrap();
    assert_ne!(a, b);

    let outcome = wire(&mut m, &mut nodes, 1, 2);
    assert_eq!(outcome, ConnectOutcome::Merged { survivor: a, absorbed: b });
    assert_eq!(m.network_count(), 1);
    assert!(m.network(b).is_none());
    for x in 0..3 {
        assert_eq!(m.network_of(point(x)), Some(a));
        assert_eq!(stored_id(&nodes, x), Some(a));
    }

    let events = m.tick(&mut nodes, one_second(), 1);
    assert_eq!(
        events,
        vec![
            NetworkEvent::Created { network: a },
            NetworkEvent::Created { network: b },
            NetworkEvent::Merged { survivor: a, absorbed: b },
        ]
    );
}

#[test]
fn cutting_a_bridge_splits_on_next_tick() {
    init_tracing();
    let mut nodes = relays(4);
    let mut m = NetworkManager::default();
    for x in 0..3 {
        wire(&mut m, &mut nodes, x, x + 1);
    }
    let id = m.network_of(point(0)).unwrap();
    m.tick(&mut nodes, one_second(), 1);

    assert!(m.on_wire_removed(&mut nodes, point(1), point(2)).is_some());
    // Deferred: still one network until the tick.
    assert_eq!(m.network_count(), 1);
    assert!(m.suspects().contains(&id));

    let events = m.tick(&mut nodes, one_second(), 2);
    assert_eq!(m.network_count(), 2);
    let new = m.network_of(point(3)).unwrap();
    assert_ne!(new, id);
    assert_eq!(events, vec![NetworkEvent::Split { original: id, new }]);

    assert_eq!(m.members(id).unwrap(), &[point(0), point(1)]);
    assert_eq!(m.network_of(point(2)), Some(new));
    assert_eq!(stored_id(&nodes, 2), Some(new));
    assert_eq!(stored_id(&nodes, 0), Some(id));
    assert!(m.validate_all(&nodes).is_empty());
}

#[test]
fn eager_detection_splits_immediately() {
    init_tracing();
    let mut nodes = relays(3);
    let mut m = NetworkManager::new(ManagerConfig {
        split_detection: SplitDetection::Eager,
        ..ManagerConfig::default()
    });
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);

    m.on_wire_removed(&mut nodes, point(0), point(1));
    assert_eq!(m.network_count(), 2);
    assert_ne!(m.network_of(point(0)), m.network_of(point(1)));
    assert!(m.suspects().is_empty());
}

#[test]
fn manual_detection_waits_for_host() {
    init_tracing();
    let mut nodes = relays(3);
    let mut m = NetworkManager::new(ManagerConfig {
        split_detection: SplitDetection::Manual,
        ..ManagerConfig::default()
    });
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);
    let id = m.network_of(point(0)).unwrap();

    m.on_wire_removed(&mut nodes, point(1), point(2));
    m.tick(&mut nodes, one_second(), 1);
    assert_eq!(m.network_count(), 1);
    assert_eq!(m.validate(&nodes, id), Ok(false));

    let created = m.resolve_splits(&mut nodes);
    assert_eq!(created.len(), 1);
    assert_eq!(m.validate(&nodes, id), Ok(true));
}

#[test]
fn breaking_the_middle_block_splits_the_line() {
    init_tracing();
    let mut nodes = relays(3);
    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);

    let broken = m.remove_block(&mut nodes, pos(1));
    assert!(broken.is_some());
    assert!(nodes.key_at(point(1)).is_none());
    assert_eq!(m.network_of(point(1)), None);
    assert_eq!(m.topology().edge_count(), 0);

    m.tick(&mut nodes, one_second(), 1);
    assert_eq!(m.network_count(), 2);
}

#[test]
fn breaking_the_last_member_removes_the_network() {
    init_tracing();
    let mut nodes = relays(1);
    let mut m = NetworkManager::default();
    let id = m.create_network(&mut nodes, point(0)).unwrap();
    m.tick(&mut nodes, one_second(), 1);

    m.remove_block(&mut nodes, pos(0));
    assert_eq!(m.network_count(), 0);
    let events = m.tick(&mut nodes, one_second(), 2);
    assert_eq!(events, vec![NetworkEvent::Removed { network: id }]);
}

#[test]
fn unloaded_chunk_keeps_membership_and_rejoins() {
    init_tracing();
    let mut nodes = NodeStore::new();
    spawn(&mut nodes, producer(0, 400, 400, RateLimit::Unlimited));
    spawn(&mut nodes, relay(1));
    spawn(&mut nodes, consumer(2, 400, RateLimit::Unlimited));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);
    let id = m.network_of(point(0)).unwrap();

    // The consumer's chunk unloads: it is still a member but gets nothing.
    let unloaded = m.unload_block(&mut nodes, pos(2)).expect("consumer was loaded");
    assert_eq!(m.network_of(point(2)), Some(id));
    assert_eq!(m.network(id).unwrap().attached_count(), 2);
    m.tick(&mut nodes, one_second(), 1);
    assert_eq!(unloaded.current_power(), 0);

    // Reloading reattaches it under the manager's id.
    nodes.insert_boxed(unloaded).unwrap();
    assert_eq!(m.rejoin_block(&mut nodes, pos(2)), vec![id]);
    m.tick(&mut nodes, one_second(), 2);
    let key = nodes.key_at(point(2)).unwrap();
    assert_eq!(power_of(&nodes, key), 400);
}

#[test]
fn merge_while_unloaded_rejoins_the_survivor() {
    init_tracing();
    let mut nodes = relays(5);
    let mut m = NetworkManager::default();
    // Network A: 0 - 1. Network B: 2 - 3 - 4.
    let a = wire(&mut m, &mut nodes, 0, 1).network().unwrap();
    let b = wire(&mut m, &mut nodes, 2, 3).network().unwrap();
    wire(&mut m, &mut nodes, 3, 4);

    let away = m.unload_block(&mut nodes, pos(0)).unwrap();
    assert_eq!(away.electrical().network_id(0), Some(a));

    // Joining the networks while node 0 is away: B is larger and survives.
    let outcome = wire(&mut m, &mut nodes, 1, 2);
    assert_eq!(outcome, ConnectOutcome::Merged { survivor: b, absorbed: a });

    nodes.insert_boxed(away).unwrap();
    assert_eq!(m.rejoin(&mut nodes, point(0)), Some(b));
    assert_eq!(stored_id(&nodes, 0), Some(b));
    assert!(m.validate_all(&nodes).is_empty());
}

#[test]
fn wire_to_unloaded_end_is_rejected() {
    init_tracing();
    let mut nodes = relays(1);
    let mut m = NetworkManager::default();
    assert!(m
        .on_wire_connected(&mut nodes, point(0), point(9), WireTier(0))
        .is_err());
    assert_eq!(m.topology().edge_count(), 0);
    assert_eq!(m.network_count(), 0);
}
