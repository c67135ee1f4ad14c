//! Validated node type definitions, keyed by name.

use std::collections::BTreeMap;
use std::path::Path;

use gridwire_core::id::BlockPos;
use gridwire_core::node::{ElectricalComponent, NodeSpec, RateLimit, Role};

use crate::loader::DataLoadError;
use crate::schema::{NodeTypeData, RateData};

/// Every node type loaded from data files.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    specs: BTreeMap<String, NodeSpec>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a spec under `name`, returning the spec it replaced.
    pub fn insert(&mut self, name: impl Into<String>, spec: NodeSpec) -> Option<NodeSpec> {
        self.specs.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&NodeSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeSpec)> {
        self.specs.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// A fresh component of type `name` placed at `pos`.
    pub fn build(&self, name: &str, pos: BlockPos) -> Option<ElectricalComponent> {
        self.get(name).map(|spec| ElectricalComponent::from_spec(pos, spec))
    }

    pub(crate) fn specs(&self) -> &BTreeMap<String, NodeSpec> {
        &self.specs
    }
}

/// Parse a data-file rate.
pub fn parse_rate(rate: &RateData, file: &Path) -> Result<RateLimit, DataLoadError> {
    match rate {
        RateData::Amount(amount) => Ok(RateLimit::from_legacy(*amount)),
        RateData::Keyword(word) => match word.as_str() {
            "unlimited" => Ok(RateLimit::Unlimited),
            "unset" => Ok(RateLimit::Unset),
            other => Err(DataLoadError::InvalidValue {
                file: file.to_path_buf(),
                field: "max_rate",
                detail: format!("expected a number, \"unlimited\" or \"unset\", got \"{other}\""),
            }),
        },
    }
}

/// Validate one node type definition.
pub fn resolve_node_type(data: &NodeTypeData, file: &Path) -> Result<NodeSpec, DataLoadError> {
    if data.name.trim().is_empty() {
        return Err(DataLoadError::InvalidValue {
            file: file.to_path_buf(),
            field: "name",
            detail: "node type name must not be empty".to_string(),
        });
    }
    if data.connection_points == 0 {
        return Err(DataLoadError::InvalidValue {
            file: file.to_path_buf(),
            field: "connection_points",
            detail: format!("'{}' needs at least one connection point", data.name),
        });
    }

    let role = Role::from(data.role);
    let mut spec = NodeSpec::new(role, data.max_power, parse_rate(&data.max_rate, file)?);
    spec.priority = data.priority;
    spec.connection_points = data.connection_points;
    if let Some(can_receive) = data.can_receive {
        spec.can_receive = can_receive;
    }
    if let Some(can_extract) = data.can_extract {
        spec.can_extract = can_extract;
    }
    Ok(spec)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RoleData;

    fn data(name: &str, role: RoleData) -> NodeTypeData {
        NodeTypeData {
            name: name.to_string(),
            role,
            max_power: 1000,
            max_rate: RateData::Amount(50),
            priority: 0,
            connection_points: 1,
            can_receive: None,
            can_extract: None,
        }
    }

    #[test]
    fn rate_keywords_and_legacy_zero() {
        let file = Path::new("node_types.ron");
        assert_eq!(parse_rate(&RateData::Amount(0), file).unwrap(), RateLimit::Unset);
        assert_eq!(parse_rate(&RateData::Amount(9), file).unwrap(), RateLimit::Limited(9));
        assert_eq!(
            parse_rate(&RateData::Keyword("unlimited".into()), file).unwrap(),
            RateLimit::Unlimited
        );
        assert_eq!(
            parse_rate(&RateData::Keyword("unset".into()), file).unwrap(),
            RateLimit::Unset
        );
        assert!(matches!(
            parse_rate(&RateData::Keyword("fast".into()), file),
            Err(DataLoadError::InvalidValue { field: "max_rate", .. })
        ));
    }

    #[test]
    fn resolve_applies_role_defaults_and_overrides() {
        let file = Path::new("node_types.ron");
        let spec = resolve_node_type(&data("battery", RoleData::Storage), file).unwrap();
        assert_eq!(spec.role, Role::Storage);
        assert!(spec.can_receive && spec.can_extract);
        assert_eq!(spec.max_rate, RateLimit::Limited(50));

        let mut one_way = data("buffer", RoleData::Storage);
        one_way.can_extract = Some(false);
        let spec = resolve_node_type(&one_way, file).unwrap();
        assert!(spec.can_receive);
        assert!(!spec.can_extract);
    }

    #[test]
    fn resolve_rejects_zero_connection_points() {
        let mut bad = data("ghost", RoleData::Relay);
        bad.connection_points = 0;
        assert!(matches!(
            resolve_node_type(&bad, Path::new("node_types.ron")),
            Err(DataLoadError::InvalidValue { field: "connection_points", .. })
        ));
    }

    #[test]
    fn resolve_rejects_empty_name() {
        assert!(matches!(
            resolve_node_type(&data("  ", RoleData::Relay), Path::new("node_types.ron")),
            Err(DataLoadError::InvalidValue { field: "name", .. })
        ));
    }

    #[test]
    fn build_places_component() {
        let mut registry = NodeTypeRegistry::new();
        let spec =
            resolve_node_type(&data("lamp", RoleData::Consumer), Path::new("x.ron")).unwrap();
        registry.insert("lamp", spec);

        let lamp = registry.build("lamp", BlockPos::new(1, 2, 3)).unwrap();
        assert_eq!(lamp.pos, BlockPos::new(1, 2, 3));
        assert_eq!(lamp.role, Role::Consumer);
        assert_eq!(lamp.max_power(), 1000);
        assert!(registry.build("missing", BlockPos::new(0, 0, 0)).is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["lamp"]);
    }
}
