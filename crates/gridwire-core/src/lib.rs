//! Gridwire Core -- identities and the electrical capability shared by every
//! powered block.
//!
//! # Key Types
//!
//! - [`id::ConnectionPoint`] -- a wire anchor: block position plus index.
//! - [`id::NetworkId`] -- network identity; id 0 is reserved as invalid.
//! - [`node::ElectricalComponent`] -- stored power, capacity, rate cap, role,
//!   priority and flags, with the receive/extract/rated/cheat operations.
//! - [`node::PowerNode`] -- trait implemented by block entities that embed
//!   an `ElectricalComponent`.
//! - [`node::RateLimit`] -- unset, limited or unlimited per-second rate.
//! - [`store::NodeStore`] -- arena of the nodes currently loaded.
//! - [`fixed::Seconds`] -- Q32.32 fixed-point tick duration.

pub mod fixed;
pub mod id;
pub mod node;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
