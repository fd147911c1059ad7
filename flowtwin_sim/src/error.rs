//! Error types for the simulation harness.

use flowtwin_core::LayoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Layout file failed to load or validate
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Runtime construction or export I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    /// Conflicting command-line options
    #[error("Invalid arguments: {0}")]
    Usage(String),
}
