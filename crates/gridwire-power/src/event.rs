//! Network lifecycle and supply events.
//!
//! Lifecycle events are queued as they happen (wire placed, block broken,
//! split resolved) and delivered together with the supply events of the
//! next [`NetworkManager::tick`](crate::manager::NetworkManager::tick).

use gridwire_core::fixed::{Power, Ticks};
use gridwire_core::id::NetworkId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    // -- Lifecycle --
    Created {
        network: NetworkId,
    },
    /// `absorbed` no longer exists; its members now belong to `survivor`.
    Merged {
        survivor: NetworkId,
        absorbed: NetworkId,
    },
    /// `new` was carved out of `original` after a wire was cut.
    Split {
        original: NetworkId,
        new: NetworkId,
    },
    Removed {
        network: NetworkId,
    },

    // -- Supply --
    /// Emitted when a network first fails to meet its consumers' demand.
    Brownout {
        network: NetworkId,
        unmet: Power,
        tick: Ticks,
    },
    /// Emitted when a network in brownout meets demand again.
    Restored {
        network: NetworkId,
        tick: Ticks,
    },
}

impl NetworkEvent {
    /// The network this event is about. For merges, the survivor; for
    /// splits, the new network.
    pub fn network(&self) -> NetworkId {
        match *self {
            NetworkEvent::Created { network }
            | NetworkEvent::Removed { network }
            | NetworkEvent::Brownout { network, .. }
            | NetworkEvent::Restored { network, .. } => network,
            NetworkEvent::Merged { survivor, .. } => survivor,
            NetworkEvent::Split { new, .. } => new,
        }
    }
}
