use std::fmt;

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a loaded electrical node in a [`NodeStore`](crate::store::NodeStore).
    /// Only meaningful for the lifetime of the store; never persisted.
    pub struct NodeKey;
}

/// A block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The connection point with the given index on the block at this position.
    pub fn point(self, index: u8) -> ConnectionPoint {
        ConnectionPoint::new(self, index)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One wire anchor on a block. A block may expose several, e.g. one per
/// power tier, and each belongs to at most one network at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub pos: BlockPos,
    pub index: u8,
}

impl ConnectionPoint {
    pub fn new(pos: BlockPos, index: u8) -> Self {
        Self { pos, index }
    }
}

impl fmt::Display for ConnectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pos, self.index)
    }
}

/// Identifies an electrical network. Id 0 is reserved and marks an
/// uninitialized or corrupted reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl NetworkId {
    /// The reserved "no network" id.
    pub const INVALID: NetworkId = NetworkId(0);

    /// The ceiling. Never assigned, so the next-id counter always fits.
    pub const MAX: NetworkId = NetworkId(u64::MAX);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "net{}", self.0)
    }
}

/// Wire type/tier recorded on each wire edge. Opaque to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireTier(pub u8);
