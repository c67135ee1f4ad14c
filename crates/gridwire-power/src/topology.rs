//! Undirected wire graph between connection points.
//!
//! Mirrors the wires reported by the host's wire-placement subsystem. The
//! engine never creates wires itself; it only reads adjacency to validate
//! membership and detect splits.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use gridwire_core::id::{ConnectionPoint, WireTier};
use serde::{Deserialize, Serialize};

/// A single wire between two connection points. Endpoints are stored in
/// ascending order so `(a, b)` and `(b, a)` name the same edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireEdge {
    pub a: ConnectionPoint,
    pub b: ConnectionPoint,
    pub tier: WireTier,
}

impl WireEdge {
    pub fn new(a: ConnectionPoint, b: ConnectionPoint, tier: WireTier) -> Self {
        let (a, b) = ordered(a, b);
        Self { a, b, tier }
    }

    /// The endpoint opposite `point`, if `point` is an endpoint.
    pub fn other(&self, point: ConnectionPoint) -> Option<ConnectionPoint> {
        if point == self.a {
            Some(self.b)
        } else if point == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

fn ordered(a: ConnectionPoint, b: ConnectionPoint) -> (ConnectionPoint, ConnectionPoint) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Adjacency plus per-edge tier. Ordered maps keep iteration deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireTopology {
    adjacency: BTreeMap<ConnectionPoint, BTreeSet<ConnectionPoint>>,
    tiers: BTreeMap<(ConnectionPoint, ConnectionPoint), WireTier>,
}

impl WireTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wire. Returns `false` for self-loops and wires that already
    /// exist; neither changes the graph.
    pub fn connect(&mut self, a: ConnectionPoint, b: ConnectionPoint, tier: WireTier) -> bool {
        if a == b || self.contains_edge(a, b) {
            return false;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
        self.tiers.insert(ordered(a, b), tier);
        true
    }

    /// Remove a wire, returning it if it existed.
    pub fn disconnect(&mut self, a: ConnectionPoint, b: ConnectionPoint) -> Option<WireEdge> {
        let tier = self.tiers.remove(&ordered(a, b))?;
        self.unlink(a, b);
        self.unlink(b, a);
        Some(WireEdge::new(a, b, tier))
    }

    fn unlink(&mut self, from: ConnectionPoint, to: ConnectionPoint) {
        if let Some(set) = self.adjacency.get_mut(&from) {
            set.remove(&to);
            if set.is_empty() {
                self.adjacency.remove(&from);
            }
        }
    }

    /// Remove every wire touching `point` (its block was broken).
    pub fn remove_point(&mut self, point: ConnectionPoint) -> Vec<WireEdge> {
        let neighbors: Vec<ConnectionPoint> = self.neighbors(point).collect();
        neighbors
            .into_iter()
            .filter_map(|other| self.disconnect(point, other))
            .collect()
    }

    pub fn contains_edge(&self, a: ConnectionPoint, b: ConnectionPoint) -> bool {
        self.tiers.contains_key(&ordered(a, b))
    }

    pub fn tier(&self, a: ConnectionPoint, b: ConnectionPoint) -> Option<WireTier> {
        self.tiers.get(&ordered(a, b)).copied()
    }

    pub fn neighbors(&self, point: ConnectionPoint) -> impl Iterator<Item = ConnectionPoint> + '_ {
        self.adjacency.get(&point).into_iter().flatten().copied()
    }

    pub fn degree(&self, point: ConnectionPoint) -> usize {
        self.adjacency.get(&point).map_or(0, |s| s.len())
    }

    pub fn edges(&self) -> impl Iterator<Item = WireEdge> + '_ {
        self.tiers
            .iter()
            .map(|(&(a, b), &tier)| WireEdge { a, b, tier })
    }

    pub fn edge_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn clear(&mut self) {
        self.adjacency.clear();
        self.tiers.clear();
    }

    /// Points reachable from `start` over wires, visiting only points
    /// accepted by `allow`. `start` itself is always included.
    pub fn reachable_from<F>(&self, start: ConnectionPoint, allow: F) -> BTreeSet<ConnectionPoint>
    where
        F: Fn(ConnectionPoint) -> bool,
    {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start);
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if allow(next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }
}
