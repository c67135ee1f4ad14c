pub mod loader;
pub mod registry;
pub mod schema;

pub use loader::{load_electrical_data, DataLoadError, ElectricalData};
pub use registry::NodeTypeRegistry;
