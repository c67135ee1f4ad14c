//! Owns every electrical network in the world.
//!
//! The manager keeps three views in sync: the wire graph reported by the
//! host, the membership of each network, and the network id each loaded
//! node records per connection point. Hosts drive it with wire events
//! (`on_wire_connected`, `on_wire_removed`), block lifecycle calls
//! (`rejoin_block`, `unload_block`, `remove_block`) and one `tick` per
//! simulation step.
//!
//! A connection point belongs to at most one network. Connecting two
//! networks merges them; cutting a wire may split one, on the schedule
//! chosen by [`SplitDetection`].

use std::collections::{BTreeMap, BTreeSet};

use gridwire_core::fixed::{Power, Seconds, Ticks};
use gridwire_core::id::{BlockPos, ConnectionPoint, NetworkId, NodeKey, WireTier};
use gridwire_core::node::PowerNode;
use gridwire_core::store::NodeStore;
use tracing::{debug, warn};

use crate::balancer::{BalanceReport, PowerBalancer};
use crate::config::{ManagerConfig, SplitDetection};
use crate::dirty::DirtyTracker;
use crate::error::NetworkError;
use crate::event::NetworkEvent;
use crate::network::Network;
use crate::topology::{WireEdge, WireTopology};

/// What a new wire did to network membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Neither end had a network; a new one now holds both.
    Created(NetworkId),
    /// One end joined the other end's network.
    Joined(NetworkId),
    /// Both ends were already in the same network.
    Unchanged(NetworkId),
    Merged {
        survivor: NetworkId,
        absorbed: NetworkId,
    },
    /// The wire already existed; nothing changed.
    Duplicate,
}

impl ConnectOutcome {
    /// The network both ends belong to afterwards, if membership was
    /// touched.
    pub fn network(self) -> Option<NetworkId> {
        match self {
            ConnectOutcome::Created(id)
            | ConnectOutcome::Joined(id)
            | ConnectOutcome::Unchanged(id) => Some(id),
            ConnectOutcome::Merged { survivor, .. } => Some(survivor),
            ConnectOutcome::Duplicate => None,
        }
    }
}

/// Every network, the wire graph they are built on, and per-tick state.
#[derive(Debug)]
pub struct NetworkManager {
    pub(crate) networks: BTreeMap<NetworkId, Network>,
    /// Which network each member point belongs to.
    pub(crate) index: BTreeMap<ConnectionPoint, NetworkId>,
    pub(crate) topology: WireTopology,
    pub(crate) next_network_id: u64,
    pub(crate) config: ManagerConfig,
    /// Networks that lost a wire or member and may need splitting.
    pub(crate) suspects: BTreeSet<NetworkId>,
    pub(crate) dirty: DirtyTracker,
    pub(crate) pending_events: Vec<NetworkEvent>,
    pub(crate) reports: BTreeMap<NetworkId, BalanceReport>,
    pub(crate) brownout: BTreeSet<NetworkId>,
    balancer: PowerBalancer,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl NetworkManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            networks: BTreeMap::new(),
            index: BTreeMap::new(),
            topology: WireTopology::new(),
            next_network_id: 1,
            config,
            suspects: BTreeSet::new(),
            dirty: DirtyTracker::new(),
            pending_events: Vec::new(),
            reports: BTreeMap::new(),
            brownout: BTreeSet::new(),
            balancer: PowerBalancer::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn topology(&self) -> &WireTopology {
        &self.topology
    }

    fn allocate_id(&mut self) -> Result<NetworkId, NetworkError> {
        if self.ids_left() == 0 {
            return Err(NetworkError::IdsExhausted);
        }
        let id = NetworkId(self.next_network_id);
        self.next_network_id += 1;
        Ok(id)
    }

    /// How many more ids can be allocated before the ceiling.
    fn ids_left(&self) -> u64 {
        NetworkId::MAX.0.saturating_sub(self.next_network_id)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Start a new network holding only `seed`.
    pub fn create_network(
        &mut self,
        nodes: &mut NodeStore,
        seed: ConnectionPoint,
    ) -> Result<NetworkId, NetworkError> {
        let key = nodes.resolve(seed)?;
        if let Some(&network) = self.index.get(&seed) {
            return Err(NetworkError::AlreadyMember {
                point: seed,
                network,
            });
        }

        let id = self.allocate_id()?;
        let mut network = Network::new(id);
        network.insert_member(seed, Some(key));
        self.networks.insert(id, network);
        self.index.insert(seed, id);
        record_id(nodes, key, seed, Some(id));

        self.dirty.mark_network(id);
        self.pending_events.push(NetworkEvent::Created { network: id });
        debug!(network = %id, seed = %seed, "created electrical network");
        Ok(id)
    }

    /// Put `point` into network `id`, creating the network if it does not
    /// exist yet. Trusted: no wiring check. Used by nodes restoring a
    /// network id they were given earlier.
    pub fn join_network(
        &mut self,
        nodes: &mut NodeStore,
        id: NetworkId,
        point: ConnectionPoint,
    ) -> Result<(), NetworkError> {
        if !id.is_valid() {
            return Err(NetworkError::ReservedNetworkId);
        }
        if id == NetworkId::MAX {
            return Err(NetworkError::IdOutOfRange(id));
        }
        let key = nodes.resolve(point)?;
        if let Some(&current) = self.index.get(&point).filter(|&&current| current != id) {
            return Err(NetworkError::AlreadyMember {
                point,
                network: current,
            });
        }

        if !self.networks.contains_key(&id) {
            self.networks.insert(id, Network::new(id));
            self.pending_events.push(NetworkEvent::Created { network: id });
            debug!(network = %id, seed = %point, "created electrical network on join");
        }
        if id.0 >= self.next_network_id {
            self.next_network_id = id.0 + 1;
        }
        if let Some(network) = self.networks.get_mut(&id) {
            network.insert_member(point, Some(key));
        }
        self.index.insert(point, id);
        record_id(nodes, key, point, Some(id));
        self.dirty.mark_network(id);
        Ok(())
    }

    /// Reconnect a freshly loaded node's connection point to its network.
    ///
    /// Membership kept by the manager wins over the id stored on the node,
    /// which may be stale after merges or splits that happened while the
    /// node was unloaded. A stored id of 0, or one naming a network that no
    /// longer exists, is treated as corruption: it is logged, cleared, and
    /// the point stays disconnected until it is wired again.
    pub fn rejoin(&mut self, nodes: &mut NodeStore, point: ConnectionPoint) -> Option<NetworkId> {
        let key = nodes.key_at(point)?;

        if let Some(&id) = self.index.get(&point) {
            if let Some(network) = self.networks.get_mut(&id) {
                network.attach(point, key);
            }
            record_id(nodes, key, point, Some(id));
            return Some(id);
        }

        let stored = nodes.get(key)?.electrical().network_id(point.index)?;
        if !stored.is_valid() {
            warn!(point = %point, "node records reserved network id 0; treating as disconnected");
            record_id(nodes, key, point, None);
            return None;
        }
        let Some(network) = self.networks.get_mut(&stored) else {
            warn!(
                point = %point,
                network = %stored,
                "node records unknown network; treating as disconnected"
            );
            record_id(nodes, key, point, None);
            return None;
        };

        // The network exists but lost track of this point.
        network.insert_member(point, Some(key));
        self.index.insert(point, stored);
        self.suspects.insert(stored);
        self.dirty.mark_network(stored);
        debug!(point = %point, network = %stored, "re-added point from stored network id");
        Some(stored)
    }

    /// Rejoin every connection point of the block at `pos`.
    pub fn rejoin_block(&mut self, nodes: &mut NodeStore, pos: BlockPos) -> Vec<NetworkId> {
        let count = nodes
            .key_at_pos(pos)
            .and_then(|key| nodes.get(key))
            .map_or(0, |node| node.connection_point_count());
        (0..count)
            .filter_map(|index| self.rejoin(nodes, pos.point(index)))
            .collect()
    }

    /// Take `point` out of network `id`. An emptied network is deleted;
    /// otherwise it may now be disconnected and is handled per
    /// [`SplitDetection`]. Returns whether `point` was a member.
    pub fn leave_network(
        &mut self,
        nodes: &mut NodeStore,
        id: NetworkId,
        point: ConnectionPoint,
    ) -> bool {
        let Some(network) = self.networks.get_mut(&id) else {
            return false;
        };
        if !network.remove_node(point) {
            return false;
        }
        let now_empty = network.is_empty();

        self.index.remove(&point);
        if let Some(key) = nodes.key_at_pos(point.pos) {
            record_id(nodes, key, point, None);
        }

        if now_empty {
            self.retire(id);
            self.pending_events.push(NetworkEvent::Removed { network: id });
            debug!(network = %id, "deleted empty electrical network");
        } else {
            self.dirty.mark_network(id);
            self.after_cut(nodes, id);
        }
        true
    }

    /// The block owning `point` was broken: drop its wires and membership.
    pub fn remove_node(
        &mut self,
        nodes: &mut NodeStore,
        point: ConnectionPoint,
    ) -> Option<NetworkId> {
        if !self.topology.remove_point(point).is_empty() {
            self.dirty.mark_topology();
        }
        let id = self.index.get(&point).copied()?;
        self.leave_network(nodes, id, point);
        Some(id)
    }

    /// The block at `pos` was broken: remove every one of its connection
    /// points from the wire graph and its networks, then drop the node.
    pub fn remove_block(
        &mut self,
        nodes: &mut NodeStore,
        pos: BlockPos,
    ) -> Option<Box<dyn PowerNode>> {
        for point in self.points_at(nodes, pos) {
            self.remove_node(nodes, point);
        }
        let key = nodes.key_at_pos(pos)?;
        nodes.remove(key)
    }

    /// The chunk holding `point` unloaded. The point stays a member; only
    /// the capability reference is dropped.
    pub fn unload(&mut self, point: ConnectionPoint) -> bool {
        let Some(id) = self.index.get(&point) else {
            return false;
        };
        self.networks
            .get_mut(id)
            .and_then(|network| network.unload(point))
            .is_some()
    }

    /// Detach every connection point of the block at `pos` and hand the
    /// node back to the host.
    pub fn unload_block(
        &mut self,
        nodes: &mut NodeStore,
        pos: BlockPos,
    ) -> Option<Box<dyn PowerNode>> {
        for point in self.points_at(nodes, pos) {
            self.unload(point);
        }
        let key = nodes.key_at_pos(pos)?;
        nodes.remove(key)
    }

    /// Connection points at `pos` that are loaded or hold membership.
    fn points_at(&self, nodes: &NodeStore, pos: BlockPos) -> BTreeSet<ConnectionPoint> {
        let count = nodes
            .key_at_pos(pos)
            .and_then(|key| nodes.get(key))
            .map_or(0, |node| node.connection_point_count());
        let mut points: BTreeSet<ConnectionPoint> = (0..count).map(|i| pos.point(i)).collect();
        points.extend(
            self.index
                .range(pos.point(0)..=pos.point(u8::MAX))
                .map(|(point, _)| *point),
        );
        points
    }

    fn retire(&mut self, id: NetworkId) {
        self.networks.remove(&id);
        self.reports.remove(&id);
        self.brownout.remove(&id);
        self.suspects.remove(&id);
        self.dirty.mark_retired(id);
    }

    // -----------------------------------------------------------------------
    // Wire events
    // -----------------------------------------------------------------------

    /// A wire was placed between `a` and `b`. Records it and merges or
    /// extends networks as needed. Both ends must be loaded.
    pub fn on_wire_connected(
        &mut self,
        nodes: &mut NodeStore,
        a: ConnectionPoint,
        b: ConnectionPoint,
        tier: WireTier,
    ) -> Result<ConnectOutcome, NetworkError> {
        if a == b {
            return Err(NetworkError::SelfLoop(a));
        }
        nodes.resolve(a)?;
        nodes.resolve(b)?;
        if !self.topology.connect(a, b, tier) {
            return Ok(ConnectOutcome::Duplicate);
        }
        self.dirty.mark_topology();
        self.merge_on_connect(nodes, a, b)
    }

    /// Bring `a` and `b` into one network after a wire between them was
    /// added to the topology.
    pub fn merge_on_connect(
        &mut self,
        nodes: &mut NodeStore,
        a: ConnectionPoint,
        b: ConnectionPoint,
    ) -> Result<ConnectOutcome, NetworkError> {
        let key_a = nodes.resolve(a)?;
        let key_b = nodes.resolve(b)?;

        match (self.index.get(&a).copied(), self.index.get(&b).copied()) {
            (None, None) => {
                if !self.topology.contains_edge(a, b) {
                    return Err(NetworkError::NotWired { a, b });
                }
                let id = self.create_network(nodes, a)?;
                self.add_member(nodes, id, b, key_b)?;
                Ok(ConnectOutcome::Created(id))
            }
            (Some(id), None) => {
                self.add_member(nodes, id, b, key_b)?;
                Ok(ConnectOutcome::Joined(id))
            }
            (None, Some(id)) => {
                self.add_member(nodes, id, a, key_a)?;
                Ok(ConnectOutcome::Joined(id))
            }
            (Some(x), Some(y)) if x == y => Ok(ConnectOutcome::Unchanged(x)),
            (Some(x), Some(y)) => {
                let (survivor, absorbed) = self.merge(nodes, x, y)?;
                Ok(ConnectOutcome::Merged { survivor, absorbed })
            }
        }
    }

    /// Add a wired point to an existing network.
    fn add_member(
        &mut self,
        nodes: &mut NodeStore,
        id: NetworkId,
        point: ConnectionPoint,
        key: NodeKey,
    ) -> Result<(), NetworkError> {
        let network = self
            .networks
            .get_mut(&id)
            .ok_or(NetworkError::UnknownNetwork(id))?;
        network.add_node(point, Some(key), false, &self.topology)?;
        self.index.insert(point, id);
        record_id(nodes, key, point, Some(id));
        self.dirty.mark_network(id);
        Ok(())
    }

    /// Merge two networks. The larger keeps its id (the lower id on a tie);
    /// the other is deleted and its members re-pointed at the survivor.
    pub fn merge(
        &mut self,
        nodes: &mut NodeStore,
        x: NetworkId,
        y: NetworkId,
    ) -> Result<(NetworkId, NetworkId), NetworkError> {
        let len_x = self.networks.get(&x).ok_or(NetworkError::UnknownNetwork(x))?.len();
        let len_y = self.networks.get(&y).ok_or(NetworkError::UnknownNetwork(y))?.len();
        let (survivor, absorbed) = match len_x.cmp(&len_y) {
            std::cmp::Ordering::Greater => (x, y),
            std::cmp::Ordering::Less => (y, x),
            std::cmp::Ordering::Equal => (x.min(y), x.max(y)),
        };

        let Some(taken) = self.networks.remove(&absorbed) else {
            return Err(NetworkError::UnknownNetwork(absorbed));
        };
        for &point in taken.members() {
            self.index.insert(point, survivor);
            if let Some(key) = taken.node(point) {
                record_id(nodes, key, point, Some(survivor));
            }
        }
        let moved = taken.len();
        if let Some(network) = self.networks.get_mut(&survivor) {
            network.absorb(taken);
        }

        if self.suspects.remove(&absorbed) {
            self.suspects.insert(survivor);
        }
        self.retire(absorbed);
        self.dirty.mark_network(survivor);
        self.pending_events.push(NetworkEvent::Merged { survivor, absorbed });
        debug!(
            survivor = %survivor,
            absorbed = %absorbed,
            moved,
            "merged electrical networks"
        );
        Ok((survivor, absorbed))
    }

    /// A wire between `a` and `b` was removed. Returns the removed wire, or
    /// `None` if it did not exist.
    pub fn on_wire_removed(
        &mut self,
        nodes: &mut NodeStore,
        a: ConnectionPoint,
        b: ConnectionPoint,
    ) -> Option<WireEdge> {
        let edge = self.topology.disconnect(a, b)?;
        self.dirty.mark_topology();
        let (x, y) = (self.network_of(a), self.network_of(b));
        if let Some(id) = x.filter(|_| x == y) {
            self.after_cut(nodes, id);
        }
        Some(edge)
    }

    /// Replay a saved wire without touching membership.
    pub fn restore_wire(&mut self, a: ConnectionPoint, b: ConnectionPoint, tier: WireTier) -> bool {
        self.topology.connect(a, b, tier)
    }

    // -----------------------------------------------------------------------
    // Split detection
    // -----------------------------------------------------------------------

    fn after_cut(&mut self, nodes: &mut NodeStore, id: NetworkId) {
        match self.config.split_detection {
            SplitDetection::Eager => {
                self.split_network(nodes, id);
            }
            SplitDetection::Deferred | SplitDetection::Manual => {
                self.suspects.insert(id);
            }
        }
    }

    /// Networks waiting for a connectivity check.
    pub fn suspects(&self) -> &BTreeSet<NetworkId> {
        &self.suspects
    }

    /// Split every suspect network. Returns the ids of networks created.
    pub fn resolve_splits(&mut self, nodes: &mut NodeStore) -> Vec<NetworkId> {
        let suspects = std::mem::take(&mut self.suspects);
        suspects
            .into_iter()
            .flat_map(|id| self.split_network(nodes, id))
            .collect()
    }

    /// Re-walk network `id` and carve every disconnected component into a
    /// network of its own. The component holding the earliest-inserted
    /// member keeps `id`. Returns the ids of networks created.
    pub fn split_network(&mut self, nodes: &mut NodeStore, id: NetworkId) -> Vec<NetworkId> {
        self.suspects.remove(&id);
        let Some(network) = self.networks.get(&id) else {
            return Vec::new();
        };
        let mut components = network.components(&self.topology);
        if components.len() <= 1 {
            return Vec::new();
        }

        let keep: BTreeSet<ConnectionPoint> = components.remove(0).into_iter().collect();
        if self.ids_left() < components.len() as u64 {
            warn!(
                network = %id,
                components = components.len() + 1,
                "network ids exhausted; leaving disconnected network unsplit"
            );
            self.suspects.insert(id);
            return Vec::new();
        }
        let dropped: BTreeMap<ConnectionPoint, Option<NodeKey>> = match self.networks.get_mut(&id) {
            Some(network) => network.split_off(&keep).into_iter().collect(),
            None => return Vec::new(),
        };
        self.dirty.mark_network(id);

        let mut created = Vec::with_capacity(components.len());
        for component in components {
            let new_id = NetworkId(self.next_network_id);
            self.next_network_id += 1;
            let mut split = Network::new(new_id);
            for point in component {
                let key = dropped.get(&point).copied().flatten();
                split.insert_member(point, key);
                self.index.insert(point, new_id);
                if let Some(key) = key {
                    record_id(nodes, key, point, Some(new_id));
                }
            }
            debug!(
                original = %id,
                new = %new_id,
                members = split.len(),
                "split electrical network"
            );
            self.networks.insert(new_id, split);
            self.dirty.mark_network(new_id);
            self.pending_events.push(NetworkEvent::Split {
                original: id,
                new: new_id,
            });
            created.push(new_id);
        }
        created
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Whether network `id` is connected and every loaded member agrees on
    /// its id.
    pub fn validate(&self, nodes: &NodeStore, id: NetworkId) -> Result<bool, NetworkError> {
        let network = self.networks.get(&id).ok_or(NetworkError::UnknownNetwork(id))?;
        Ok(network.validate(&self.topology, nodes))
    }

    /// Validate every network, logging and returning the invalid ones.
    pub fn validate_all(&self, nodes: &NodeStore) -> Vec<NetworkId> {
        let mut invalid = Vec::new();
        for (&id, network) in &self.networks {
            let faults = network.diagnose(&self.topology, nodes);
            if !faults.is_empty() {
                warn!(network = %id, ?faults, "electrical network failed validation");
                invalid.push(id);
            }
        }
        invalid
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Balance every network once, in id order.
    ///
    /// Suspect networks are split first, unless split detection is
    /// [`SplitDetection::Manual`]. Under `Eager` suspects still arise from
    /// loads, rejoins and merges that carry a pending check. Returns the
    /// lifecycle events queued since the last tick followed by
    /// brownout transitions from this tick.
    pub fn tick(
        &mut self,
        nodes: &mut NodeStore,
        dt: Seconds,
        current_tick: Ticks,
    ) -> Vec<NetworkEvent> {
        if self.config.split_detection != SplitDetection::Manual && !self.suspects.is_empty() {
            self.resolve_splits(nodes);
        }

        let mut events = std::mem::take(&mut self.pending_events);
        for (&id, network) in &self.networks {
            let report = self.balancer.balance(network, nodes, dt);

            let was_brownout = self.brownout.contains(&id);
            if report.is_brownout() && !was_brownout {
                self.brownout.insert(id);
                events.push(NetworkEvent::Brownout {
                    network: id,
                    unmet: report.unmet_demand,
                    tick: current_tick,
                });
            } else if !report.is_brownout() && was_brownout {
                self.brownout.remove(&id);
                events.push(NetworkEvent::Restored {
                    network: id,
                    tick: current_tick,
                });
            }
            self.reports.insert(id, report);
        }
        events
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(&id)
    }

    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn network_ids(&self) -> impl Iterator<Item = NetworkId> + '_ {
        self.networks.keys().copied()
    }

    /// The network `point` belongs to. `None` for points with no
    /// membership.
    pub fn network_of(&self, point: ConnectionPoint) -> Option<NetworkId> {
        self.index.get(&point).copied()
    }

    pub fn members(&self, id: NetworkId) -> Option<&[ConnectionPoint]> {
        self.networks.get(&id).map(|n| n.members())
    }

    /// Sum of power stored in the loaded nodes of network `id`.
    pub fn stored_power(&self, id: NetworkId, nodes: &NodeStore) -> Power {
        self.sum_nodes(id, nodes, |node| node.current_power())
    }

    /// Sum of capacity of the loaded nodes of network `id`.
    pub fn capacity(&self, id: NetworkId, nodes: &NodeStore) -> Power {
        self.sum_nodes(id, nodes, |node| node.max_power())
    }

    fn sum_nodes(
        &self,
        id: NetworkId,
        nodes: &NodeStore,
        f: impl Fn(&dyn PowerNode) -> Power,
    ) -> Power {
        let Some(network) = self.networks.get(&id) else {
            return 0;
        };
        let keys: BTreeSet<NodeKey> = network.attached().map(|(_, key)| key).collect();
        keys.into_iter()
            .filter_map(|key| nodes.get(key))
            .map(|node| f(node))
            .fold(0, Power::saturating_add)
    }

    /// The report from the last tick that balanced network `id`.
    pub fn last_report(&self, id: NetworkId) -> Option<&BalanceReport> {
        self.reports.get(&id)
    }

    pub fn is_brownout(&self, id: NetworkId) -> bool {
        self.brownout.contains(&id)
    }

    /// Lifecycle events not yet returned by `tick`.
    pub fn pending_events(&self) -> &[NetworkEvent] {
        &self.pending_events
    }

    /// The id the next created network will get.
    pub fn next_network_id(&self) -> NetworkId {
        NetworkId(self.next_network_id)
    }

    /// Networks whose membership changed since the last save.
    pub fn dirty_networks(&self) -> &BTreeSet<NetworkId> {
        self.dirty.dirty_networks()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }
}

/// Store `id` on the node's connection point, if the node is loaded.
fn record_id(nodes: &mut NodeStore, key: NodeKey, point: ConnectionPoint, id: Option<NetworkId>) {
    if let Some(node) = nodes.get_mut(key) {
        node.electrical_mut().set_network_id(point.index, id);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
