//! Electrical networks for Gridwire.
//!
//! Wire-connected connection points form networks. Every tick the
//! [`manager::NetworkManager`] balances each network in turn: consumers are
//! filled from producers in priority order under per-node rate caps, with
//! batteries as a fallback on both sides.
//!
//! # Design
//!
//! - The host reports wires through `on_wire_connected` / `on_wire_removed`;
//!   the manager merges networks on connect and splits them on cut, either
//!   immediately or at the next tick (see [`config::SplitDetection`]).
//! - Membership survives chunk unloads; only the capability reference is
//!   dropped, and `rejoin` reattaches it.
//! - Power is conserved: the balancer only moves power, and refunds
//!   anything a consumer refuses.
//! - Brownout/restored events fire only on *transitions*, not every tick.

pub mod balancer;
pub mod config;
pub mod dirty;
pub mod error;
pub mod event;
pub mod manager;
pub mod network;
pub mod persist;
pub mod topology;

pub use balancer::{BalanceReport, PowerBalancer};
pub use config::{ManagerConfig, SplitDetection};
pub use error::NetworkError;
pub use event::NetworkEvent;
pub use manager::{ConnectOutcome, NetworkManager};
pub use network::{Network, NetworkFault};
pub use persist::{DeserializeError, MemorySaveStore, SaveStore, SerializeError};
pub use topology::{WireEdge, WireTopology};
