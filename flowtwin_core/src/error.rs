//! Error types for topology loading and validation.

use thiserror::Error;

/// Errors raised while loading or validating a factory layout.
///
/// These are the only hard errors in the core: runtime invariant violations
/// are reported as rejected events, never as errors.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Station {from} references unknown station {missing}")]
    UnknownStation { from: String, missing: String },

    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Station map key {key} does not match station id {station_id}")]
    KeyMismatch { key: String, station_id: String },

    #[error("Sensor {sensor_id}: {field} {value} is outside [0, 1]")]
    OutOfRange {
        sensor_id: String,
        field: &'static str,
        value: f64,
    },

    #[error("Station {0} has an inverted processing-time range")]
    InvertedRange(String),

    #[error("Line {0} has no stations")]
    EmptyLine(String),

    #[error("Layout has no production lines")]
    NoLines,

    #[error("Layout parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Layout I/O error: {0}")]
    Io(#[from] std::io::Error),
}
