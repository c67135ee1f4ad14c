//! The electrical capability every powered block implements.
//!
//! All power bookkeeping lives in one [`ElectricalComponent`]. Concrete
//! block entities embed a component and implement [`PowerNode`] by exposing
//! it; every capability operation is a provided method that delegates to
//! the component, so producers, consumers, batteries and relays share a
//! single implementation.
//!
//! Capability operations never fail. A disabled node, a full battery or an
//! empty generator is reported purely through return values, which lets the
//! balancer treat every node uniformly.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fixed::{Power, Seconds, scale_rate};
use crate::id::{BlockPos, NetworkId};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// What a node does on its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Consumer,
    Producer,
    Storage,
    Transformer,
    Toggle,
    Relay,
    Other,
}

impl Role {
    pub fn all() -> [Role; 7] {
        [
            Role::Consumer,
            Role::Producer,
            Role::Storage,
            Role::Transformer,
            Role::Toggle,
            Role::Relay,
            Role::Other,
        ]
    }

    /// Default `(can_receive, can_extract)` flags for a freshly built node.
    pub fn default_flow(self) -> (bool, bool) {
        match self {
            Role::Consumer => (true, false),
            Role::Producer => (false, true),
            Role::Storage => (true, true),
            Role::Transformer | Role::Toggle | Role::Relay | Role::Other => (false, false),
        }
    }
}

// ---------------------------------------------------------------------------
// Rate limit
// ---------------------------------------------------------------------------

/// Maximum transfer rate of a node, in power per second.
///
/// `Unset` and `Unlimited` both impose no cap; they are kept apart so that
/// a node that was never configured can be told from one that is meant to
/// move any amount in a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLimit {
    #[default]
    Unset,
    Limited(Power),
    Unlimited,
}

impl RateLimit {
    /// Convert a legacy numeric rate where 0 meant "no limit".
    pub fn from_legacy(rate: Power) -> Self {
        if rate == 0 {
            RateLimit::Unset
        } else {
            RateLimit::Limited(rate)
        }
    }

    /// The numeric per-second rate, 0 when uncapped.
    pub fn as_legacy(self) -> Power {
        match self {
            RateLimit::Limited(rate) => rate,
            RateLimit::Unset | RateLimit::Unlimited => 0,
        }
    }

    pub fn is_configured(self) -> bool {
        !matches!(self, RateLimit::Unset)
    }

    /// Amount that may move over `dt`. A limited rate that rounds to zero
    /// moves nothing this tick.
    pub fn per_tick(self, dt: Seconds) -> Power {
        match self {
            RateLimit::Unset | RateLimit::Unlimited => Power::MAX,
            RateLimit::Limited(rate) => scale_rate(rate, dt),
        }
    }
}

// ---------------------------------------------------------------------------
// Node spec
// ---------------------------------------------------------------------------

/// Validated definition of a node type, resolved once from data files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub role: Role,
    pub max_power: Power,
    pub max_rate: RateLimit,
    pub priority: i32,
    pub connection_points: u8,
    pub can_receive: bool,
    pub can_extract: bool,
}

impl NodeSpec {
    /// A single-point spec with the role's default flow flags.
    pub fn new(role: Role, max_power: Power, max_rate: RateLimit) -> Self {
        let (can_receive, can_extract) = role.default_flow();
        Self {
            role,
            max_power,
            max_rate,
            priority: 0,
            connection_points: 1,
            can_receive,
            can_extract,
        }
    }
}

// ---------------------------------------------------------------------------
// Electrical component
// ---------------------------------------------------------------------------

/// Power state of one block. `0 <= current_power <= max_power` always holds;
/// every mutator clamps, and so does loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ComponentData")]
pub struct ElectricalComponent {
    pub pos: BlockPos,
    connection_points: u8,
    current_power: Power,
    max_power: Power,
    pub max_rate: RateLimit,
    pub role: Role,
    /// Lower is served (and drained) first.
    pub priority: i32,
    pub enabled: bool,
    /// Enabled but idle; the host ticks sleeping machines less often.
    pub sleeping: bool,
    pub can_receive: bool,
    pub can_extract: bool,
    /// Network id per connection point index.
    network_ids: BTreeMap<u8, NetworkId>,
    #[serde(skip)]
    dirty: bool,
}

/// Saved shape of an [`ElectricalComponent`], before clamping.
#[derive(Deserialize)]
struct ComponentData {
    pos: BlockPos,
    connection_points: u8,
    current_power: Power,
    max_power: Power,
    max_rate: RateLimit,
    role: Role,
    priority: i32,
    enabled: bool,
    sleeping: bool,
    can_receive: bool,
    can_extract: bool,
    network_ids: BTreeMap<u8, NetworkId>,
}

impl From<ComponentData> for ElectricalComponent {
    fn from(data: ComponentData) -> Self {
        let current_power = data.current_power.min(data.max_power);
        Self {
            pos: data.pos,
            connection_points: data.connection_points,
            current_power,
            max_power: data.max_power,
            max_rate: data.max_rate,
            role: data.role,
            priority: data.priority,
            enabled: data.enabled,
            sleeping: data.sleeping,
            can_receive: data.can_receive,
            can_extract: data.can_extract,
            network_ids: data.network_ids,
            // Overfull saves are corrected and written back.
            dirty: current_power != data.current_power,
        }
    }
}

impl ElectricalComponent {
    /// An enabled single-point node with the role's default flow flags.
    pub fn new(pos: BlockPos, role: Role, max_power: Power, max_rate: RateLimit) -> Self {
        Self::from_spec(pos, &NodeSpec::new(role, max_power, max_rate))
    }

    pub fn from_spec(pos: BlockPos, spec: &NodeSpec) -> Self {
        Self {
            pos,
            connection_points: spec.connection_points,
            current_power: 0,
            max_power: spec.max_power,
            max_rate: spec.max_rate,
            role: spec.role,
            priority: spec.priority,
            enabled: true,
            sleeping: false,
            can_receive: spec.can_receive,
            can_extract: spec.can_extract,
            network_ids: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_power(mut self, power: Power) -> Self {
        self.current_power = power.min(self.max_power);
        self
    }

    pub fn with_connection_points(mut self, count: u8) -> Self {
        self.connection_points = count;
        self
    }

    pub fn connection_points(&self) -> u8 {
        self.connection_points
    }

    pub fn current_power(&self) -> Power {
        self.current_power
    }

    pub fn max_power(&self) -> Power {
        self.max_power
    }

    /// Free capacity left before the node is full.
    pub fn headroom(&self) -> Power {
        self.max_power.saturating_sub(self.current_power)
    }

    /// Set the stored amount, clamped to `max_power`.
    pub fn set_current_power(&mut self, power: Power) {
        let clamped = power.min(self.max_power);
        if clamped != self.current_power {
            self.current_power = clamped;
            self.dirty = true;
        }
    }

    /// Change capacity. Stored power above the new maximum is discarded.
    pub fn set_max_power(&mut self, max_power: Power) {
        self.max_power = max_power;
        if self.current_power > max_power {
            self.current_power = max_power;
        }
        self.dirty = true;
    }

    pub fn can_receive_power(&self) -> bool {
        self.enabled && self.can_receive
    }

    pub fn can_extract_power(&self) -> bool {
        self.enabled && self.can_extract
    }

    /// Accept up to `offered`, returning the part that was not accepted.
    pub fn receive_power(&mut self, offered: Power, dt: Seconds, simulate: bool) -> Power {
        if !self.can_receive_power() {
            return offered;
        }
        let accepted = offered.min(self.max_rate.per_tick(dt)).min(self.headroom());
        if !simulate && accepted > 0 {
            self.current_power += accepted;
            self.dirty = true;
        }
        offered - accepted
    }

    /// Give up to `wanted`, returning the part that could not be supplied.
    pub fn extract_power(&mut self, wanted: Power, dt: Seconds, simulate: bool) -> Power {
        if !self.can_extract_power() {
            return wanted;
        }
        let given = wanted.min(self.max_rate.per_tick(dt)).min(self.current_power);
        if !simulate && given > 0 {
            self.current_power -= given;
            self.dirty = true;
        }
        wanted - given
    }

    /// The most this node could accept (`is_insert`) or supply this tick.
    pub fn rated_power(&self, dt: Seconds, is_insert: bool) -> Power {
        if is_insert {
            if !self.can_receive_power() {
                return 0;
            }
            self.max_rate.per_tick(dt).min(self.headroom())
        } else {
            if !self.can_extract_power() {
                return 0;
            }
            self.max_rate.per_tick(dt).min(self.current_power)
        }
    }

    /// Fill to capacity, or drain to zero. Ignores flags and rate caps.
    pub fn cheat_power(&mut self, drain: bool) {
        self.current_power = if drain { 0 } else { self.max_power };
        self.dirty = true;
    }

    /// Put back power taken earlier in the same tick, ignoring flags and
    /// rate caps. Returns the part that no longer fits.
    pub fn refund(&mut self, amount: Power) -> Power {
        let restored = amount.min(self.headroom());
        if restored > 0 {
            self.current_power += restored;
            self.dirty = true;
        }
        amount - restored
    }

    /// Network recorded for the connection point at `index`, if any.
    pub fn network_id(&self, index: u8) -> Option<NetworkId> {
        self.network_ids.get(&index).copied()
    }

    pub fn set_network_id(&mut self, index: u8, id: Option<NetworkId>) {
        let changed = match id {
            Some(id) => self.network_ids.insert(index, id) != Some(id),
            None => self.network_ids.remove(&index).is_some(),
        };
        if changed {
            self.dirty = true;
        }
    }

    pub fn network_ids(&self) -> impl Iterator<Item = (u8, NetworkId)> + '_ {
        self.network_ids.iter().map(|(&i, &id)| (i, id))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

// ---------------------------------------------------------------------------
// PowerNode capability
// ---------------------------------------------------------------------------

/// Implemented by every electrical block entity.
///
/// Implementors only provide access to their embedded
/// [`ElectricalComponent`]; the capability operations are provided.
pub trait PowerNode: std::fmt::Debug {
    fn electrical(&self) -> &ElectricalComponent;

    fn electrical_mut(&mut self) -> &mut ElectricalComponent;

    /// Downcast to `&dyn Any` for access to the concrete entity type.
    fn as_any(&self) -> &dyn Any;

    /// Downcast to `&mut dyn Any` for access to the concrete entity type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn position(&self) -> BlockPos {
        self.electrical().pos
    }

    fn connection_point_count(&self) -> u8 {
        self.electrical().connection_points()
    }

    fn role(&self) -> Role {
        self.electrical().role
    }

    fn priority(&self) -> i32 {
        self.electrical().priority
    }

    fn enabled(&self) -> bool {
        self.electrical().enabled
    }

    fn current_power(&self) -> Power {
        self.electrical().current_power()
    }

    fn max_power(&self) -> Power {
        self.electrical().max_power()
    }

    fn max_rate_per_second(&self) -> Power {
        self.electrical().max_rate.as_legacy()
    }

    fn can_receive_power(&self) -> bool {
        self.electrical().can_receive_power()
    }

    fn can_extract_power(&self) -> bool {
        self.electrical().can_extract_power()
    }

    fn receive_power(&mut self, offered: Power, dt: Seconds, simulate: bool) -> Power {
        self.electrical_mut().receive_power(offered, dt, simulate)
    }

    fn extract_power(&mut self, wanted: Power, dt: Seconds, simulate: bool) -> Power {
        self.electrical_mut().extract_power(wanted, dt, simulate)
    }

    fn rated_power(&self, dt: Seconds, is_insert: bool) -> Power {
        self.electrical().rated_power(dt, is_insert)
    }

    fn cheat_power(&mut self, drain: bool) {
        self.electrical_mut().cheat_power(drain);
    }
}

impl PowerNode for ElectricalComponent {
    fn electrical(&self) -> &ElectricalComponent {
        self
    }

    fn electrical_mut(&mut self) -> &mut ElectricalComponent {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ===========================================================================
// Tests
// ===========================================================================
