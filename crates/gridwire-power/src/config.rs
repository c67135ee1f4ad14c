use serde::{Deserialize, Serialize};

/// When the manager re-walks a network after one of its wires is cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDetection {
    /// Split immediately inside `on_wire_removed`. Checks queued by loads
    /// and rejoins run at the next tick.
    Eager,
    /// Mark the network suspect and split at the start of the next tick.
    #[default]
    Deferred,
    /// Only split when the host calls `resolve_splits`.
    Manual,
}

/// Tunables for [`NetworkManager`](crate::manager::NetworkManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub split_detection: SplitDetection,
    /// Queue every restored network for a connectivity check after load.
    pub revalidate_on_load: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_defer_split_detection() {
        let config = ManagerConfig::default();
        assert_eq!(config.split_detection, SplitDetection::Deferred);
        assert!(!config.revalidate_on_load);
    }
}
