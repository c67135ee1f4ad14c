//! World-save persistence for network membership.
//!
//! Two blobs are written under fixed keys: the membership of every network
//! and the next network id to allocate. Wires are not saved here; the
//! wiring subsystem owns them and replays them through
//! [`NetworkManager::restore_wire`] on load. Node power levels are saved
//! with their block entities.
//!
//! Save and load are full-snapshot operations run at world save/load
//! boundaries, never between ticks.

use std::collections::BTreeMap;

use gridwire_core::id::{ConnectionPoint, NetworkId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::manager::NetworkManager;
use crate::network::Network;

/// Key of the network membership blob.
pub const SAVE_KEY_NETWORKS: &str = "electricalnetworks";

/// Key of the next-network-id blob.
pub const SAVE_KEY_NEXT_ID: &str = "electricalnetworknextid";

/// Magic number identifying a network membership blob.
pub const SNAPSHOT_MAGIC: u32 = 0x6E57_0001;

/// Current format version. Increment when breaking the blob layout.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Save store
// ---------------------------------------------------------------------------

/// Keyed byte storage provided by the host's world-save framework.
pub trait SaveStore {
    fn read(&self, key: &str) -> Option<Vec<u8>>;

    fn write(&mut self, key: &str, bytes: Vec<u8>);
}

/// In-memory [`SaveStore`], for tests and tools.
#[derive(Debug, Clone, Default)]
pub struct MemorySaveStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl SaveStore for MemorySaveStore {
    fn read(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, bytes: Vec<u8>) {
        self.entries.insert(key.to_string(), bytes);
    }
}

// ---------------------------------------------------------------------------
// Snapshot format
// ---------------------------------------------------------------------------

/// Header at the front of every membership blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
}

impl SnapshotHeader {
    /// Create a header for the current format version.
    pub fn new() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    /// Validate the header. Returns `Ok(())` if valid.
    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One saved network: its id and members in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: NetworkId,
    pub members: Vec<ConnectionPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworksSnapshot {
    header: SnapshotHeader,
    networks: Vec<NetworkRecord>,
}

// ---------------------------------------------------------------------------
// Manager persistence
// ---------------------------------------------------------------------------

impl NetworkManager {
    /// Drop every network and wire, as for a new world.
    pub fn reset(&mut self) {
        self.clear_membership();
        self.topology.clear();
        self.next_network_id = 1;
        self.dirty.mark_clean();
    }

    fn clear_membership(&mut self) {
        self.networks.clear();
        self.index.clear();
        self.suspects.clear();
        self.pending_events.clear();
        self.reports.clear();
        self.brownout.clear();
    }

    /// Membership records for every network, in id order.
    pub fn records(&self) -> Vec<NetworkRecord> {
        self.networks
            .values()
            .map(|network| NetworkRecord {
                id: network.id(),
                members: network.members().to_vec(),
            })
            .collect()
    }

    /// Encode the membership blob.
    pub fn network_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = NetworksSnapshot {
            header: SnapshotHeader::new(),
            networks: self.records(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Encode the next-network-id blob.
    pub fn next_id_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(&self.next_network_id).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Replace all membership with the networks in `bytes`.
    ///
    /// Records with the reserved id 0 or the ceiling id, repeated ids, or
    /// points already claimed by an earlier record are skipped with a
    /// warning. The next id never
    /// falls at or below a restored id; when `next_id` is missing it is
    /// derived from the largest restored id. Restored members have no
    /// capability attached until their nodes call
    /// [`rejoin`](NetworkManager::rejoin). The wire graph is left untouched.
    pub fn initialize_networks(
        &mut self,
        bytes: &[u8],
        next_id: Option<u64>,
    ) -> Result<usize, DeserializeError> {
        let snapshot: NetworksSnapshot =
            bitcode::deserialize(bytes).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        self.clear_membership();
        let mut max_id = 0;
        for record in snapshot.networks {
            if !record.id.is_valid() {
                warn!(members = record.members.len(), "skipping saved network with reserved id 0");
                continue;
            }
            if record.id == NetworkId::MAX {
                warn!(network = %record.id, "skipping saved network with out-of-range id");
                continue;
            }
            if self.networks.contains_key(&record.id) {
                warn!(network = %record.id, "skipping repeated saved network");
                continue;
            }

            let mut network = Network::new(record.id);
            for point in record.members {
                if let Some(&owner) = self.index.get(&point) {
                    warn!(
                        point = %point,
                        network = %record.id,
                        owner = %owner,
                        "point saved in two networks; keeping first"
                    );
                    continue;
                }
                network.insert_member(point, None);
                self.index.insert(point, record.id);
            }
            if network.is_empty() {
                warn!(network = %record.id, "skipping empty saved network");
                continue;
            }
            max_id = max_id.max(record.id.0);
            self.networks.insert(record.id, network);
        }

        self.next_network_id = match next_id {
            Some(next) => next.max(max_id + 1),
            None => {
                warn!(
                    derived = max_id + 1,
                    "next network id missing; deriving from saved networks"
                );
                max_id + 1
            }
        };
        if self.config.revalidate_on_load {
            self.suspects.extend(self.networks.keys().copied());
        }
        self.dirty.mark_clean();

        let count = self.networks.len();
        info!(networks = count, next_id = self.next_network_id, "restored electrical networks");
        Ok(count)
    }

    /// Write both blobs and mark everything clean.
    pub fn save_to(&mut self, store: &mut dyn SaveStore) -> Result<(), SerializeError> {
        store.write(SAVE_KEY_NETWORKS, self.network_bytes()?);
        store.write(SAVE_KEY_NEXT_ID, self.next_id_bytes()?);
        self.dirty.mark_clean();
        Ok(())
    }

    /// Restore membership from `store`. A world with no saved networks
    /// loads empty. An unreadable next-id blob is logged and derived
    /// instead.
    pub fn load_from(&mut self, store: &dyn SaveStore) -> Result<usize, DeserializeError> {
        let next_id = store.read(SAVE_KEY_NEXT_ID).and_then(|bytes| {
            match bitcode::deserialize::<u64>(&bytes) {
                Ok(next) => Some(next),
                Err(e) => {
                    warn!(
                        key = SAVE_KEY_NEXT_ID,
                        len = bytes.len(),
                        error = %e,
                        "failed to decode next network id"
                    );
                    None
                }
            }
        });

        match store.read(SAVE_KEY_NETWORKS) {
            Some(bytes) => self.initialize_networks(&bytes, next_id),
            None => {
                self.clear_membership();
                self.next_network_id = next_id.unwrap_or(1).max(1);
                self.dirty.mark_clean();
                info!("no saved electrical networks");
                Ok(0)
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
