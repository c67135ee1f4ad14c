//! A single electrical network: a wire-connected set of connection points.

use std::collections::{BTreeMap, BTreeSet};

use gridwire_core::id::{ConnectionPoint, NetworkId, NodeKey};
use gridwire_core::node::Role;
use gridwire_core::store::NodeStore;

use crate::error::NetworkError;
use crate::topology::WireTopology;

/// Something wrong found while validating a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkFault {
    /// The network carries the reserved id 0.
    InvalidId,
    /// The network has no members left.
    Empty,
    /// Members not reachable from the first member over member-only wires.
    Disconnected { unreachable: Vec<ConnectionPoint> },
    /// A loaded node records a different network for this point.
    IdMismatch {
        point: ConnectionPoint,
        stored: Option<NetworkId>,
    },
}

/// Members of one network in insertion order, plus the capability
/// reference of each member whose block is currently loaded.
///
/// Insertion order is the balancer's tie-break between equal priorities.
#[derive(Debug, Clone)]
pub struct Network {
    id: NetworkId,
    members: Vec<ConnectionPoint>,
    /// Same points as `members`, for lookups.
    member_set: BTreeSet<ConnectionPoint>,
    nodes: BTreeMap<ConnectionPoint, NodeKey>,
}

impl Network {
    /// Create a new empty network.
    pub fn new(id: NetworkId) -> Self {
        Self {
            id,
            members: Vec::new(),
            member_set: BTreeSet::new(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    /// Add a member. Outside the trusted restore path (`from_save`), a point
    /// joining a non-empty network must be wired to an existing member.
    /// Re-adding a member only (re)attaches its capability.
    pub fn add_node(
        &mut self,
        point: ConnectionPoint,
        node: Option<NodeKey>,
        from_save: bool,
        topology: &WireTopology,
    ) -> Result<(), NetworkError> {
        if !from_save
            && !self.members.is_empty()
            && !self.contains(point)
            && !topology.neighbors(point).any(|n| self.contains(n))
        {
            return Err(NetworkError::NotReachable {
                point,
                network: self.id,
            });
        }
        self.insert_member(point, node);
        Ok(())
    }

    /// Add a member without the wiring check. Used on restore and split.
    pub(crate) fn insert_member(&mut self, point: ConnectionPoint, node: Option<NodeKey>) {
        if self.member_set.insert(point) {
            self.members.push(point);
        }
        if let Some(key) = node {
            self.nodes.insert(point, key);
        }
    }

    /// Remove a member entirely. Returns whether it was a member.
    pub fn remove_node(&mut self, point: ConnectionPoint) -> bool {
        self.nodes.remove(&point);
        if !self.member_set.remove(&point) {
            return false;
        }
        self.members.retain(|p| *p != point);
        true
    }

    /// Attach the capability of a loaded member. Returns `false` if `point`
    /// is not a member.
    pub fn attach(&mut self, point: ConnectionPoint, key: NodeKey) -> bool {
        if !self.contains(point) {
            return false;
        }
        self.nodes.insert(point, key);
        true
    }

    /// Forget the capability of a member whose block unloaded. The point
    /// stays a member so membership survives saves.
    pub fn unload(&mut self, point: ConnectionPoint) -> Option<NodeKey> {
        self.nodes.remove(&point)
    }

    pub fn contains(&self, point: ConnectionPoint) -> bool {
        self.member_set.contains(&point)
    }

    pub fn members(&self) -> &[ConnectionPoint] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The loaded node behind a member, if any.
    pub fn node(&self, point: ConnectionPoint) -> Option<NodeKey> {
        self.nodes.get(&point).copied()
    }

    /// Loaded members in insertion order.
    pub fn attached(&self) -> impl Iterator<Item = (ConnectionPoint, NodeKey)> + '_ {
        self.members
            .iter()
            .filter_map(|p| self.nodes.get(p).map(|k| (*p, *k)))
    }

    pub fn attached_count(&self) -> usize {
        self.nodes.len()
    }

    /// Loaded members whose node has `role`, in insertion order.
    pub fn members_by_role(&self, role: Role, nodes: &NodeStore) -> Vec<ConnectionPoint> {
        self.attached()
            .filter(|(_, key)| nodes.get(*key).is_some_and(|n| n.role() == role))
            .map(|(point, _)| point)
            .collect()
    }

    /// Move every member of `other` into this network, keeping `other`'s
    /// insertion order after this network's own members.
    pub(crate) fn absorb(&mut self, other: Network) {
        for point in other.members {
            if self.member_set.insert(point) {
                self.members.push(point);
            }
        }
        self.nodes.extend(other.nodes);
    }

    /// Drop every member not in `keep`, returning the dropped members with
    /// their capabilities, in insertion order.
    pub(crate) fn split_off(
        &mut self,
        keep: &BTreeSet<ConnectionPoint>,
    ) -> Vec<(ConnectionPoint, Option<NodeKey>)> {
        let mut dropped = Vec::new();
        let mut kept = Vec::with_capacity(keep.len());
        for point in self.members.drain(..) {
            if keep.contains(&point) {
                kept.push(point);
            } else {
                self.member_set.remove(&point);
                dropped.push((point, self.nodes.remove(&point)));
            }
        }
        self.members = kept;
        dropped
    }

    /// Connected components over wires between members. Components are
    /// ordered by their earliest-inserted member, and each component lists
    /// members in insertion order.
    pub fn components(&self, topology: &WireTopology) -> Vec<Vec<ConnectionPoint>> {
        let mut assigned: BTreeSet<ConnectionPoint> = BTreeSet::new();
        let mut groups: Vec<BTreeSet<ConnectionPoint>> = Vec::new();

        for &point in &self.members {
            if assigned.contains(&point) {
                continue;
            }
            let group = topology.reachable_from(point, |p| self.member_set.contains(&p));
            assigned.extend(group.iter().copied());
            groups.push(group);
        }

        groups
            .into_iter()
            .map(|group| {
                self.members
                    .iter()
                    .copied()
                    .filter(|p| group.contains(p))
                    .collect()
            })
            .collect()
    }

    /// Every problem found with this network. Empty means valid.
    pub fn diagnose(&self, topology: &WireTopology, nodes: &NodeStore) -> Vec<NetworkFault> {
        let mut faults = Vec::new();
        if !self.id.is_valid() {
            faults.push(NetworkFault::InvalidId);
        }
        if self.members.is_empty() {
            faults.push(NetworkFault::Empty);
            return faults;
        }

        let components = self.components(topology);
        if components.len() > 1 {
            let unreachable = components.into_iter().skip(1).flatten().collect();
            faults.push(NetworkFault::Disconnected { unreachable });
        }

        for (point, key) in self.attached() {
            let stored = nodes
                .get(key)
                .and_then(|n| n.electrical().network_id(point.index));
            if stored != Some(self.id) {
                faults.push(NetworkFault::IdMismatch { point, stored });
            }
        }
        faults
    }

    /// Re-walk wires between members and check every loaded member records
    /// this network's id.
    pub fn validate(&self, topology: &WireTopology, nodes: &NodeStore) -> bool {
        self.diagnose(topology, nodes).is_empty()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
