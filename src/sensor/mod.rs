//! Sensor collaborator for signed vitals.
//!
//! Hardware drivers are out of scope; this module defines the raw sample
//! type and a simulated source feeding the producer loop.

pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use simulated::{SensorConfig, SensorError, SignalModel, SimulatedSensor};
pub use types::{default_source_id, RawSample, SampleKind};
