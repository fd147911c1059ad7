//! Event sinks: where part agents and the simulator deliver their events.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use flowtwin_env::Transport;

use crate::codec;
use crate::event::{EventKind, PlantEvent};

/// Destination for emitted plant events. Emission never fails from the
/// producer's point of view; sinks absorb their own errors.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: PlantEvent);
}

/// Collects events in memory. Cloning yields another handle onto the same
/// buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<PlantEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn events(&self) -> Vec<PlantEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Removes and returns everything emitted so far.
    pub fn drain(&self) -> Vec<PlantEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    /// Events concerning `part_id`, in emission order.
    pub fn for_part(&self, part_id: &str) -> Vec<PlantEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.part_id() == Some(part_id))
            .cloned()
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: PlantEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

/// Encodes events and publishes them on a transport.
pub struct TransportSink<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> TransportSink<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }
}

impl<T: Transport> EventSink for TransportSink<T> {
    fn emit(&self, event: PlantEvent) {
        let envelope = match codec::encode(&event) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(kind = ?event.kind(), error = %e, "dropping event that failed to encode");
                return;
            }
        };
        if let Err(e) = self.transport.publish(envelope) {
            warn!(kind = ?event.kind(), error = %e, "publish failed");
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: PlantEvent) {
        (**self).emit(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PartOverride;

    fn ov(part: &str) -> PlantEvent {
        PlantEvent::PartOverride(PartOverride {
            part_id: part.into(),
            area: "a".into(),
            line: "l".into(),
            timestamp_ms: 1,
        })
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        handle.emit(ov("P-1"));
        handle.emit(ov("P-2"));

        assert_eq!(sink.count(EventKind::PartOverride), 2);
        assert_eq!(sink.for_part("P-2").len(), 1);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_arc_dyn_sink() {
        let sink = MemorySink::new();
        let shared: Arc<dyn EventSink> = Arc::new(sink.clone());
        shared.emit(ov("P-1"));
        assert_eq!(sink.events().len(), 1);
    }
}
