//! Common types for the FlowTwin environment abstraction.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A message on the plant bus: a hierarchical topic plus an opaque payload.
///
/// This is the transport-layer wrapper; turning payload bytes into typed
/// events is the job of the codec in `flowtwin_core`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Slash-separated topic, e.g. `factory/assembly-a/line-aa1/transit/start`
    pub topic: String,

    /// Raw payload bytes (JSON in practice)
    pub payload: Vec<u8>,

    /// Publish time (sender's clock, ms since epoch)
    pub timestamp_ms: u64,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp_ms,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Splits the topic into its segments.
    pub fn segments(&self) -> Vec<&str> {
        self.topic.split('/').collect()
    }
}

/// Milliseconds since the Unix epoch; times before the epoch clamp to 0.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
