//! Loading pipeline: finds data files, deserializes them, validates node
//! types and builds the registry.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by [`load_electrical_data`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gridwire_power::config::ManagerConfig;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::registry::{resolve_node_type, NodeTypeRegistry};
use crate::schema::NodeTypeData;

/// Base name of the required node type file.
pub const NODE_TYPES_FILE: &str = "node_types";

/// Base name of the optional manager configuration file.
pub const NETWORK_FILE: &str = "network";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// A field parsed but holds a value the engine cannot use.
    #[error("invalid {field} in {file}: {detail}")]
    InvalidValue {
        file: PathBuf,
        field: &'static str,
        detail: String,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let mut table: toml::Table =
                toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .remove(toml_key)
                .ok_or_else(|| {
                    parse_error(path, format!("missing key '{toml_key}' in TOML file"))
                })?;
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Name checks
// ===========================================================================

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &BTreeMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything the electrical engine reads from data files.
#[derive(Debug, Clone, Default)]
pub struct ElectricalData {
    pub node_types: NodeTypeRegistry,
    pub manager: ManagerConfig,
}

/// Load and validate node types from a single file.
pub fn load_node_types(path: &Path) -> Result<NodeTypeRegistry, DataLoadError> {
    let entries: Vec<NodeTypeData> = deserialize_list(path, NODE_TYPES_FILE)?;
    let mut registry = NodeTypeRegistry::new();
    for entry in &entries {
        check_duplicate(registry.specs(), &entry.name, path)?;
        let spec = resolve_node_type(entry, path)?;
        registry.insert(entry.name.clone(), spec);
    }
    debug!(file = %path.display(), count = registry.len(), "loaded node types");
    Ok(registry)
}

/// Load every electrical data file in `dir`.
///
/// `node_types.{ron,toml,json}` is required; `network.{ron,toml,json}` is
/// optional and falls back to [`ManagerConfig::default`].
pub fn load_electrical_data(dir: &Path) -> Result<ElectricalData, DataLoadError> {
    let node_types_path = require_data_file(dir, NODE_TYPES_FILE)?;
    let node_types = load_node_types(&node_types_path)?;

    let manager = match find_data_file(dir, NETWORK_FILE)? {
        Some(path) => deserialize_file(&path)?,
        None => ManagerConfig::default(),
    };

    info!(
        dir = %dir.display(),
        node_types = node_types.len(),
        split_detection = ?manager.split_detection,
        "loaded electrical data"
    );
    Ok(ElectricalData {
        node_types,
        manager,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
