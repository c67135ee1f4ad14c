//! Per-tick power distribution inside one network.
//!
//! Consumers are served in ascending priority; for each one the balancer
//! pulls from producers in ascending priority, then pushes the pulled total
//! into the consumer. Batteries take part on both sides but only as a
//! fallback: they discharge after every dedicated producer, charge after
//! every dedicated consumer, and only charge from dedicated producers so
//! power never shuffles between batteries.
//!
//! Equal priorities keep network insertion order. A node exposing several
//! connection points on the same network takes part once.
//!
//! Rate caps are per network. A node whose connection points sit on two
//! different networks is balanced once in each, so it can move up to its
//! rate in each of them during one tick.

use std::collections::BTreeSet;

use gridwire_core::fixed::{Power, Seconds};
use gridwire_core::id::NodeKey;
use gridwire_core::node::Role;
use gridwire_core::store::NodeStore;
use tracing::trace;

use crate::network::Network;

/// Outcome of balancing one network for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceReport {
    /// Total power moved from producers into consumers.
    pub delivered: Power,
    /// Demand of dedicated consumers left unmet this tick.
    pub unmet_demand: Power,
    /// Dedicated consumers that received less than they asked for.
    pub starved: Vec<NodeKey>,
}

impl BalanceReport {
    pub fn is_brownout(&self) -> bool {
        self.unmet_demand > 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Participant {
    key: NodeKey,
    priority: i32,
    /// Dedicated producer/consumer (`true`) or battery fallback.
    dedicated: bool,
    /// Power this producer may still give this tick.
    budget: Power,
}

impl Participant {
    fn sort_key(&self) -> (bool, i32) {
        (!self.dedicated, self.priority)
    }
}

/// Reusable balancing pass. Holds scratch buffers so steady-state ticks do
/// not allocate.
#[derive(Debug, Default)]
pub struct PowerBalancer {
    producers: Vec<Participant>,
    consumers: Vec<Participant>,
    draws: Vec<(usize, Power)>,
    seen: BTreeSet<NodeKey>,
}

impl PowerBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move power between the loaded members of `network` for a tick of
    /// length `dt`. Never fails; shortfalls show up in the report.
    pub fn balance(
        &mut self,
        network: &Network,
        nodes: &mut NodeStore,
        dt: Seconds,
    ) -> BalanceReport {
        self.collect(network, nodes, dt);

        let mut report = BalanceReport::default();
        for ci in 0..self.consumers.len() {
            let consumer = self.consumers[ci];
            let Some(demand) = nodes.get(consumer.key).map(|n| n.rated_power(dt, true)) else {
                continue;
            };
            if demand == 0 {
                continue;
            }

            let pulled = self.pull(consumer, demand, nodes, dt);
            let received = self.push(consumer, pulled, nodes, dt);

            if received > 0 {
                trace!(
                    network = %network.id(),
                    consumer = ?consumer.key,
                    amount = received,
                    "delivered power"
                );
            }
            report.delivered += received;
            if consumer.dedicated && received < demand {
                report.unmet_demand += demand - received;
                report.starved.push(consumer.key);
            }
        }
        report
    }

    /// Build the ordered producer and consumer lists for this tick.
    fn collect(&mut self, network: &Network, nodes: &NodeStore, dt: Seconds) {
        self.producers.clear();
        self.consumers.clear();
        self.seen.clear();

        for (_, key) in network.attached() {
            if !self.seen.insert(key) {
                continue;
            }
            let Some(node) = nodes.get(key) else {
                continue;
            };
            let role = node.role();
            let priority = node.priority();

            if node.can_extract_power() && matches!(role, Role::Producer | Role::Storage) {
                self.producers.push(Participant {
                    key,
                    priority,
                    dedicated: role == Role::Producer,
                    budget: node.rated_power(dt, false),
                });
            }
            if node.can_receive_power() && matches!(role, Role::Consumer | Role::Storage) {
                self.consumers.push(Participant {
                    key,
                    priority,
                    dedicated: role == Role::Consumer,
                    budget: 0,
                });
            }
        }

        // Stable sorts keep insertion order between equal keys.
        self.producers.sort_by_key(Participant::sort_key);
        self.consumers.sort_by_key(Participant::sort_key);
    }

    /// Extract up to `demand` from producers in order, recording each draw.
    fn pull(
        &mut self,
        consumer: Participant,
        demand: Power,
        nodes: &mut NodeStore,
        dt: Seconds,
    ) -> Power {
        self.draws.clear();
        let mut remaining = demand;

        for (pi, producer) in self.producers.iter_mut().enumerate() {
            if remaining == 0 {
                break;
            }
            if producer.key == consumer.key || producer.budget == 0 {
                continue;
            }
            // Batteries only charge from dedicated producers.
            if !consumer.dedicated && !producer.dedicated {
                continue;
            }
            let Some(node) = nodes.get_mut(producer.key) else {
                producer.budget = 0;
                continue;
            };

            let wanted = remaining.min(producer.budget);
            let leftover = node.extract_power(wanted, dt, false);
            let given = wanted - leftover;
            if leftover > 0 {
                producer.budget = 0;
            } else {
                producer.budget -= given;
            }
            if given > 0 {
                remaining -= given;
                self.draws.push((pi, given));
            }
        }
        demand - remaining
    }

    /// Deliver `pulled` to the consumer and hand back whatever it refused.
    fn push(
        &mut self,
        consumer: Participant,
        pulled: Power,
        nodes: &mut NodeStore,
        dt: Seconds,
    ) -> Power {
        if pulled == 0 {
            return 0;
        }
        let mut leftover = match nodes.get_mut(consumer.key) {
            Some(node) => node.receive_power(pulled, dt, false),
            None => pulled,
        };
        let received = pulled - leftover;

        // Return refused power to the producers it came from, latest first.
        while leftover > 0 {
            let Some((pi, amount)) = self.draws.pop() else {
                break;
            };
            let back = amount.min(leftover);
            let producer = &mut self.producers[pi];
            if let Some(node) = nodes.get_mut(producer.key) {
                let lost = node.electrical_mut().refund(back);
                producer.budget += back - lost;
            }
            leftover -= back;
        }
        received
    }
}

/// Balance a single network with a throwaway balancer.
pub fn balance_network(network: &Network, nodes: &mut NodeStore, dt: Seconds) -> BalanceReport {
    PowerBalancer::new().balance(network, nodes, dt)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::WireTopology;
    use gridwire_core::fixed::seconds;
    use gridwire_core::id::NetworkId;
    use gridwire_core::node::{ElectricalComponent, RateLimit};
    use gridwire_core::test_utils::*;

    /// A network holding `nodes` in the given order, trusted (no wires).
    fn network_of(
        store: &mut NodeStore,
        nodes: Vec<ElectricalComponent>,
    ) -> (Network, Vec<NodeKey>) {
        let topo = WireTopology::new();
        let mut net = Network::new(NetworkId(1));
        let mut keys = Vec::new();
        for node in nodes {
            let p = node.pos.point(0);
            let key = spawn(store, node);
            net.add_node(p, Some(key), true, &topo).unwrap();
            keys.push(key);
        }
        (net, keys)
    }

    fn total(store: &NodeStore) -> Power {
        store.iter().map(|(_, n)| n.current_power()).sum()
    }

    #[test]
    fn lower_priority_producer_drains_first() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 100, 100, RateLimit::Unlimited).with_priority(2),
                producer(2, 100, 100, RateLimit::Unlimited).with_priority(1),
                consumer(3, 150, RateLimit::Unlimited),
            ],
        );
        let report = balance_network(&net, &mut store, one_second());

        assert_eq!(power_of(&store, k[1]), 0);
        assert_eq!(power_of(&store, k[0]), 50);
        assert_eq!(power_of(&store, k[2]), 150);
        assert_eq!(report.delivered, 150);
        assert!(!report.is_brownout());
    }

    #[test]
    fn producer_rate_caps_transfer() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 1000, 1000, RateLimit::Limited(10)),
                consumer(2, 500, RateLimit::Unlimited),
            ],
        );
        let report = balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[1]), 10);
        assert_eq!(power_of(&store, k[0]), 990);
        assert_eq!(report.unmet_demand, 490);
        assert_eq!(report.starved, vec![k[1]]);
    }

    #[test]
    fn rate_cap_holds_across_consumers() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 1000, 1000, RateLimit::Limited(10)),
                consumer(2, 500, RateLimit::Unlimited),
                consumer(3, 500, RateLimit::Unlimited),
            ],
        );
        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[1]) + power_of(&store, k[2]), 10);
        assert_eq!(power_of(&store, k[0]), 990);
    }

    #[test]
    fn unlimited_rates_transfer_fully() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 1000, 1000, RateLimit::Unset),
                consumer(2, 500, RateLimit::Unset),
            ],
        );
        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[0]), 500);
        assert_eq!(power_of(&store, k[1]), 500);
    }

    #[test]
    fn consumer_rate_limits_demand() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 1000, 1000, RateLimit::Unlimited),
                consumer(2, 500, RateLimit::Limited(40)),
            ],
        );
        let report = balance_network(&net, &mut store, seconds(0.5));
        assert_eq!(power_of(&store, k[1]), 20);
        assert_eq!(power_of(&store, k[0]), 980);
        assert!(!report.is_brownout());
    }

    #[test]
    fn equal_priority_follows_insertion_order() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 60, 100, RateLimit::Unlimited),
                consumer(2, 50, RateLimit::Unlimited),
                consumer(3, 50, RateLimit::Unlimited),
            ],
        );
        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[1]), 50);
        assert_eq!(power_of(&store, k[2]), 10);
    }

    #[test]
    fn consumer_priority_decides_who_is_served() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                producer(1, 50, 100, RateLimit::Unlimited),
                consumer(2, 50, RateLimit::Unlimited).with_priority(5),
                consumer(3, 50, RateLimit::Unlimited).with_priority(-1),
            ],
        );
        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[2]), 50);
        assert_eq!(power_of(&store, k[1]), 0);
    }

    #[test]
    fn storage_discharges_after_producers() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                storage(1, 100, 100, RateLimit::Unlimited).with_priority(-10),
                producer(2, 30, 100, RateLimit::Unlimited),
                consumer(3, 80, RateLimit::Unlimited),
            ],
        );
        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[1]), 0);
        assert_eq!(power_of(&store, k[0]), 50);
        assert_eq!(power_of(&store, k[2]), 80);
    }

    #[test]
    fn storage_charges_from_surplus_only() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                storage(1, 0, 100, RateLimit::Unlimited),
                producer(2, 100, 100, RateLimit::Unlimited),
                consumer(3, 60, RateLimit::Unlimited),
            ],
        );
        let report = balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[2]), 60);
        assert_eq!(power_of(&store, k[0]), 40);
        assert_eq!(power_of(&store, k[1]), 0);
        assert_eq!(report.delivered, 100);
    }

    #[test]
    fn batteries_do_not_feed_each_other() {
        let mut store = NodeStore::new();
        let (net, k) = network_of(
            &mut store,
            vec![
                storage(1, 100, 100, RateLimit::Unlimited),
                storage(2, 0, 100, RateLimit::Unlimited),
            ],
        );
        let report = balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[0]), 100);
        assert_eq!(power_of(&store, k[1]), 0);
        assert_eq!(report, BalanceReport::default());
    }

    #[test]
    fn disabled_nodes_are_skipped() {
        let mut store = NodeStore::new();
        let mut off = producer(1, 100, 100, RateLimit::Unlimited);
        off.enabled = false;
        let (net, k) = network_of(&mut store, vec![off, consumer(2, 50, RateLimit::Unlimited)]);
        let report = balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, k[0]), 100);
        assert_eq!(report.unmet_demand, 50);
    }

    #[test]
    fn full_consumers_have_no_demand() {
        let mut store = NodeStore::new();
        let (net, _) = network_of(
            &mut store,
            vec![
                producer(1, 100, 100, RateLimit::Unlimited),
                consumer(2, 0, RateLimit::Unlimited),
                relay(3),
            ],
        );
        let report = balance_network(&net, &mut store, one_second());
        assert_eq!(report, BalanceReport::default());
    }

    #[test]
    fn multi_point_node_counted_once() {
        let mut store = NodeStore::new();
        let topo = WireTopology::new();
        let mut net = Network::new(NetworkId(1));
        let p = spawn(
            &mut store,
            producer(1, 100, 100, RateLimit::Limited(10)).with_connection_points(2),
        );
        let c = spawn(&mut store, consumer(2, 100, RateLimit::Unlimited));
        net.add_node(pos(1).point(0), Some(p), true, &topo).unwrap();
        net.add_node(pos(1).point(1), Some(p), true, &topo).unwrap();
        net.add_node(point(2), Some(c), true, &topo).unwrap();

        balance_network(&net, &mut store, one_second());
        assert_eq!(power_of(&store, c), 10);
    }

    #[test]
    fn balancing_conserves_power() {
        let mut store = NodeStore::new();
        let (net, _) = network_of(
            &mut store,
            vec![
                producer(1, 333, 500, RateLimit::Limited(70)),
                storage(2, 120, 200, RateLimit::Limited(45)),
                consumer(3, 90, RateLimit::Unlimited).with_priority(1),
                consumer(4, 400, RateLimit::Limited(100)),
                storage(5, 10, 300, RateLimit::Unlimited),
            ],
        );
        let before = total(&store);
        let mut balancer = PowerBalancer::new();
        for _ in 0..5 {
            balancer.balance(&net, &mut store, seconds(0.25));
            assert_eq!(total(&store), before);
        }
    }
}
