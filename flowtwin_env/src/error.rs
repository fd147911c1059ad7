//! Error types for the FlowTwin environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The transport's receiving side is gone.
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// Envelope payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl EnvError {
    /// Creates a transport-closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::TransportClosed(msg.into())
    }

    /// Creates a codec error.
    pub fn codec(err: impl std::fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}
