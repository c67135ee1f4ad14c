//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, other crates' tests, and benchmarks (via the
//! `test-utils` feature).

use crate::fixed::{Fixed64, Power, Seconds};
use crate::id::{BlockPos, ConnectionPoint, NodeKey};
use crate::node::{ElectricalComponent, RateLimit, Role};
use crate::store::NodeStore;

// ===========================================================================
// Fixed-point helpers
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// One second, the `dt` most tests balance with.
pub fn one_second() -> Seconds {
    Fixed64::from_num(1)
}

// ===========================================================================
// Positions
// ===========================================================================

/// Block position `(x, 0, 0)`. Tests lay nodes out along the x axis.
pub fn pos(x: i32) -> BlockPos {
    BlockPos::new(x, 0, 0)
}

/// Connection point 0 of the block at `(x, 0, 0)`.
pub fn point(x: i32) -> ConnectionPoint {
    pos(x).point(0)
}

// ===========================================================================
// Node constructors
// ===========================================================================

/// A generator holding `stored` of `max` power.
pub fn producer(x: i32, stored: Power, max: Power, rate: RateLimit) -> ElectricalComponent {
    ElectricalComponent::new(pos(x), Role::Producer, max, rate).with_power(stored)
}

/// An empty machine that can buffer up to `max` power.
pub fn consumer(x: i32, max: Power, rate: RateLimit) -> ElectricalComponent {
    ElectricalComponent::new(pos(x), Role::Consumer, max, rate)
}

/// A battery holding `stored` of `max` power.
pub fn storage(x: i32, stored: Power, max: Power, rate: RateLimit) -> ElectricalComponent {
    ElectricalComponent::new(pos(x), Role::Storage, max, rate).with_power(stored)
}

/// A pass-through relay with no buffer.
pub fn relay(x: i32) -> ElectricalComponent {
    ElectricalComponent::new(pos(x), Role::Relay, 0, RateLimit::Unlimited)
}

/// Insert a node into the store, panicking on a position clash.
pub fn spawn(store: &mut NodeStore, node: ElectricalComponent) -> NodeKey {
    store.insert(node).expect("test node positions must be unique")
}

/// Stored power of the node at `key`.
pub fn power_of(store: &NodeStore, key: NodeKey) -> Power {
    store
        .get(key)
        .map(|n| n.current_power())
        .expect("node should be loaded")
}
