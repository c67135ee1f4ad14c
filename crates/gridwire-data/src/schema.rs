//! Raw data-file shapes, before validation.
//!
//! These mirror what authors write in `node_types.{ron,toml,json}`. Roles
//! and rates stay loose here and are checked once when the registry is
//! built.

use serde::Deserialize;

use gridwire_core::node::Role;

/// Role of a node type, written in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleData {
    Consumer,
    Producer,
    Storage,
    Transformer,
    Toggle,
    Relay,
    Other,
}

impl From<RoleData> for Role {
    fn from(role: RoleData) -> Self {
        match role {
            RoleData::Consumer => Role::Consumer,
            RoleData::Producer => Role::Producer,
            RoleData::Storage => Role::Storage,
            RoleData::Transformer => Role::Transformer,
            RoleData::Toggle => Role::Toggle,
            RoleData::Relay => Role::Relay,
            RoleData::Other => Role::Other,
        }
    }
}

/// A transfer rate: either a per-second amount or a keyword
/// (`"unlimited"` / `"unset"`). A legacy amount of `0` means unset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RateData {
    Amount(u64),
    Keyword(String),
}

impl Default for RateData {
    fn default() -> Self {
        RateData::Amount(0)
    }
}

/// One node type definition.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeTypeData {
    pub name: String,
    pub role: RoleData,
    pub max_power: u64,
    #[serde(default)]
    pub max_rate: RateData,
    /// Lower is served first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_connection_points")]
    pub connection_points: u8,
    /// Overrides the role's default.
    #[serde(default)]
    pub can_receive: Option<bool>,
    /// Overrides the role's default.
    #[serde(default)]
    pub can_extract: Option<bool>,
}

fn default_connection_points() -> u8 {
    1
}

/// Wrapper for a list of node types in TOML format.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlNodeTypes {
    pub node_types: Vec<NodeTypeData>,
}

// ===========================================================================
// Tests
// ===========================================================================
