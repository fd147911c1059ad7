//! Transport abstraction between event producers and the state tracker.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::Envelope;

/// Abstraction for the plant message bus.
///
/// # Implementations
///
/// - **Production**: an MQTT/WebSocket adapter (outside this workspace)
/// - **Simulation**: channel-based bus with duplicate injection
///
/// # Message Flow
///
/// ```text
/// PartAgent              Transport                 StateTracker
///   |                        |                          |
///   |-- publish(envelope) -->|                          |
///   |                        |-- [duplicates?] -------->|
///   |                        |                          |-- recv() -> envelope
/// ```
///
/// Delivery is at-least-once with no ordering guarantee across topics.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publishes an envelope.
    ///
    /// # Returns
    /// * `Ok(())` - Envelope queued for delivery
    /// * `Err(EnvError::TransportClosed)` - The receiving side is gone
    fn publish(&self, envelope: Envelope) -> Result<(), EnvError>;

    /// Receives the next envelope, waiting until one arrives.
    ///
    /// Returns `None` once the bus is closed.
    async fn recv(&self) -> Option<Envelope>;

    /// Receives the next envelope if one is already queued.
    fn try_recv(&self) -> Option<Envelope>;
}
