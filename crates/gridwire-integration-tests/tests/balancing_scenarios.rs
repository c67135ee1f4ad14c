//! Integration test: balancing through the network manager.
//!
//! Builds small wired layouts, ticks the manager and checks where the power
//! ended up: priority order, rate caps, full transfers, battery fallback and
//! brownout transitions.

use gridwire_core::fixed::Power;
use gridwire_core::id::WireTier;
use gridwire_core::node::RateLimit;
use gridwire_core::store::NodeStore;
use gridwire_core::test_utils::*;
use gridwire_integration_tests::init_tracing;
use gridwire_power::{ConnectOutcome, NetworkEvent, NetworkManager};

fn wire(m: &mut NetworkManager, nodes: &mut NodeStore, a: i32, b: i32) -> ConnectOutcome {
    m.on_wire_connected(nodes, point(a), point(b), WireTier(0))
        .expect("both ends are loaded")
}

fn total(nodes: &NodeStore) -> Power {
    nodes.iter().map(|(_, n)| n.current_power()).sum()
}

#[test]
fn lower_priority_value_drains_first() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p1 = spawn(&mut nodes, producer(0, 100, 100, RateLimit::Unlimited).with_priority(1));
    let c = spawn(&mut nodes, consumer(1, 150, RateLimit::Unlimited));
    let p2 = spawn(&mut nodes, producer(2, 100, 100, RateLimit::Unlimited).with_priority(2));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);
    assert_eq!(m.network_count(), 1);

    m.tick(&mut nodes, one_second(), 1);

    assert_eq!(power_of(&nodes, p1), 0);
    assert_eq!(power_of(&nodes, p2), 50);
    assert_eq!(power_of(&nodes, c), 150);
    let id = m.network_of(point(1)).unwrap();
    assert_eq!(m.last_report(id).unwrap().delivered, 150);
    assert!(!m.is_brownout(id));
}

#[test]
fn producer_rate_caps_each_tick() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p = spawn(&mut nodes, producer(0, 1000, 1000, RateLimit::Limited(10)));
    let c = spawn(&mut nodes, consumer(1, 1000, RateLimit::Unlimited));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);

    for tick in 1..=3 {
        m.tick(&mut nodes, one_second(), tick);
    }
    assert_eq!(power_of(&nodes, c), 30);
    assert_eq!(power_of(&nodes, p), 970);

    // Half a second moves half the rate.
    m.tick(&mut nodes, fixed(0.5), 4);
    assert_eq!(power_of(&nodes, c), 35);
}

#[test]
fn uncapped_rates_transfer_everything_that_fits() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p = spawn(&mut nodes, producer(0, 1000, 1000, RateLimit::from_legacy(0)));
    let c = spawn(&mut nodes, consumer(1, 500, RateLimit::from_legacy(0)));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    m.tick(&mut nodes, one_second(), 1);

    assert_eq!(power_of(&nodes, p), 500);
    assert_eq!(power_of(&nodes, c), 500);
}

#[test]
fn batteries_charge_from_surplus_and_cover_deficit() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p = spawn(&mut nodes, producer(0, 300, 300, RateLimit::Unlimited));
    let c = spawn(&mut nodes, consumer(1, 100, RateLimit::Unlimited));
    let b = spawn(&mut nodes, storage(2, 0, 1000, RateLimit::Unlimited));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);

    // Surplus goes to the battery once the consumer is full.
    m.tick(&mut nodes, one_second(), 1);
    assert_eq!(power_of(&nodes, c), 100);
    assert_eq!(power_of(&nodes, b), 200);
    assert_eq!(power_of(&nodes, p), 0);

    // With the producer empty, the battery refills the consumer.
    nodes.get_mut(c).unwrap().electrical_mut().set_current_power(20);
    m.tick(&mut nodes, one_second(), 2);
    assert_eq!(power_of(&nodes, c), 100);
    assert_eq!(power_of(&nodes, b), 120);
}

#[test]
fn brownout_and_restore_fire_once_per_transition() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p = spawn(&mut nodes, producer(0, 100, 1000, RateLimit::Unlimited));
    spawn(&mut nodes, consumer(1, 150, RateLimit::Unlimited));

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    let id = m.network_of(point(0)).unwrap();

    let events = m.tick(&mut nodes, one_second(), 1);
    assert!(events.contains(&NetworkEvent::Created { network: id }));
    assert!(events.contains(&NetworkEvent::Brownout {
        network: id,
        unmet: 50,
        tick: 1,
    }));
    assert!(m.is_brownout(id));

    // Still short, no repeat event.
    let events = m.tick(&mut nodes, one_second(), 2);
    assert!(events.is_empty());

    nodes.get_mut(p).unwrap().cheat_power(false);
    let events = m.tick(&mut nodes, one_second(), 3);
    assert_eq!(events, vec![NetworkEvent::Restored { network: id, tick: 3 }]);
    assert!(!m.is_brownout(id));
}

#[test]
fn power_is_conserved_across_many_ticks() {
    init_tracing();
    let mut nodes = NodeStore::new();
    spawn(&mut nodes, producer(0, 5000, 5000, RateLimit::Limited(120)));
    spawn(&mut nodes, producer(1, 800, 1000, RateLimit::Limited(40)).with_priority(-1));
    spawn(&mut nodes, storage(2, 250, 2000, RateLimit::Limited(75)));
    spawn(&mut nodes, consumer(3, 600, RateLimit::Limited(90)).with_priority(2));
    spawn(&mut nodes, consumer(4, 300, RateLimit::Unlimited));
    spawn(&mut nodes, relay(5));

    let mut m = NetworkManager::default();
    for x in 0..5 {
        wire(&mut m, &mut nodes, x, x + 1);
    }
    let before = total(&nodes);
    for tick in 1..=50 {
        m.tick(&mut nodes, fixed(0.05), tick);
        assert_eq!(total(&nodes), before, "tick {tick} changed the total");
    }
}

#[test]
fn disabled_nodes_are_skipped() {
    init_tracing();
    let mut nodes = NodeStore::new();
    let p = spawn(&mut nodes, producer(0, 500, 500, RateLimit::Unlimited));
    let off = spawn(&mut nodes, consumer(1, 500, RateLimit::Unlimited));
    let on = spawn(&mut nodes, consumer(2, 500, RateLimit::Unlimited));
    nodes.get_mut(off).unwrap().electrical_mut().enabled = false;

    let mut m = NetworkManager::default();
    wire(&mut m, &mut nodes, 0, 1);
    wire(&mut m, &mut nodes, 1, 2);
    m.tick(&mut nodes, one_second(), 1);

    assert_eq!(power_of(&nodes, off), 0);
    assert_eq!(power_of(&nodes, on), 500);
    assert_eq!(power_of(&nodes, p), 0);
}
