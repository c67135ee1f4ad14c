//! Arena of the electrical nodes currently loaded in the world.
//!
//! Block entities load and unload with their chunks, so the store is the
//! single place that answers "which node owns this connection point right
//! now". Networks refer to nodes by [`NodeKey`] and resolve them here.

use std::collections::BTreeMap;

use slotmap::SlotMap;

use crate::id::{BlockPos, ConnectionPoint, NodeKey};
use crate::node::PowerNode;

/// Errors raised when registering or resolving nodes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a node is already registered at {0}")]
    PositionOccupied(BlockPos),
    #[error("node at {0} exposes no connection points")]
    NoConnectionPoints(BlockPos),
    #[error("no node loaded at {0}")]
    UnknownPoint(ConnectionPoint),
    #[error(
        "connection index {} out of range at {} ({available} available)",
        .point.index,
        .point.pos
    )]
    InvalidConnectionIndex {
        point: ConnectionPoint,
        available: u8,
    },
}

/// Owns every loaded [`PowerNode`], indexed by block position.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: SlotMap<NodeKey, Box<dyn PowerNode>>,
    positions: BTreeMap<BlockPos, NodeKey>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node at its own position.
    pub fn insert<N: PowerNode + 'static>(&mut self, node: N) -> Result<NodeKey, StoreError> {
        self.insert_boxed(Box::new(node))
    }

    pub fn insert_boxed(&mut self, node: Box<dyn PowerNode>) -> Result<NodeKey, StoreError> {
        let pos = node.position();
        if self.positions.contains_key(&pos) {
            return Err(StoreError::PositionOccupied(pos));
        }
        if node.connection_point_count() == 0 {
            return Err(StoreError::NoConnectionPoints(pos));
        }
        let key = self.nodes.insert(node);
        self.positions.insert(pos, key);
        Ok(key)
    }

    /// Unregister a node, returning it.
    pub fn remove(&mut self, key: NodeKey) -> Option<Box<dyn PowerNode>> {
        let node = self.nodes.remove(key)?;
        self.positions.remove(&node.position());
        Some(node)
    }

    pub fn get(&self, key: NodeKey) -> Option<&dyn PowerNode> {
        self.nodes.get(key).map(|n| n.as_ref())
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut (dyn PowerNode + 'static)> {
        self.nodes.get_mut(key).map(|n| n.as_mut())
    }

    /// Borrow a node as its concrete entity type.
    pub fn get_as<T: 'static>(&self, key: NodeKey) -> Option<&T> {
        self.get(key)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: 'static>(&mut self, key: NodeKey) -> Option<&mut T> {
        self.get_mut(key)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn key_at_pos(&self, pos: BlockPos) -> Option<NodeKey> {
        self.positions.get(&pos).copied()
    }

    /// The node owning `point`, or `None` if nothing is loaded there or the
    /// index is out of range.
    pub fn key_at(&self, point: ConnectionPoint) -> Option<NodeKey> {
        self.resolve(point).ok()
    }

    /// Like [`key_at`](Self::key_at) but says why the lookup failed.
    pub fn resolve(&self, point: ConnectionPoint) -> Result<NodeKey, StoreError> {
        let key = self
            .key_at_pos(point.pos)
            .ok_or(StoreError::UnknownPoint(point))?;
        let available = self.nodes[key].connection_point_count();
        if point.index >= available {
            return Err(StoreError::InvalidConnectionIndex { point, available });
        }
        Ok(key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, &dyn PowerNode)> {
        self.nodes.iter().map(|(k, n)| (k, n.as_ref()))
    }

    /// Keys of nodes whose persisted state changed, clearing their flags.
    pub fn take_dirty(&mut self) -> Vec<NodeKey> {
        self.nodes
            .iter_mut()
            .filter_map(|(key, node)| node.electrical_mut().take_dirty().then_some(key))
            .collect()
    }
}
