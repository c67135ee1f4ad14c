use std::collections::BTreeSet;

use gridwire_core::id::NetworkId;

/// Tracks which networks changed since the last save.
///
/// The persistence layer only needs to rewrite the network blob when
/// something here is set. Call [`mark_clean`](DirtyTracker::mark_clean)
/// after a successful save.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty_networks: BTreeSet<NetworkId>,
    retired: BTreeSet<NetworkId>,
    topology_dirty: bool,
    any_dirty: bool,
}

impl DirtyTracker {
    /// Create a new tracker with nothing dirty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a network whose membership changed.
    pub fn mark_network(&mut self, id: NetworkId) {
        self.dirty_networks.insert(id);
        self.any_dirty = true;
    }

    /// Mark a network that was removed or absorbed.
    pub fn mark_retired(&mut self, id: NetworkId) {
        self.dirty_networks.remove(&id);
        self.retired.insert(id);
        self.any_dirty = true;
    }

    /// Mark the wire graph as changed.
    pub fn mark_topology(&mut self) {
        self.topology_dirty = true;
        self.any_dirty = true;
    }

    /// Returns `true` if anything has been marked dirty since the last clean.
    pub fn is_dirty(&self) -> bool {
        self.any_dirty
    }

    pub fn is_network_dirty(&self, id: NetworkId) -> bool {
        self.dirty_networks.contains(&id)
    }

    pub fn is_topology_dirty(&self) -> bool {
        self.topology_dirty
    }

    pub fn dirty_networks(&self) -> &BTreeSet<NetworkId> {
        &self.dirty_networks
    }

    /// Networks removed since the last clean.
    pub fn retired(&self) -> &BTreeSet<NetworkId> {
        &self.retired
    }

    /// Reset all dirty flags, marking everything as clean.
    pub fn mark_clean(&mut self) {
        self.dirty_networks.clear();
        self.retired.clear();
        self.topology_dirty = false;
        self.any_dirty = false;
    }
}
