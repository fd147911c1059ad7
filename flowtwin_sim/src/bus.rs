//! Simulated plant bus with duplicate injection.

use async_trait::async_trait;
use flowtwin_env::{EnvError, Envelope, Transport};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// In-memory bus between the event producers and the tracker.
///
/// Delivery is at-least-once: the controller can deliver an envelope twice.
/// A duplicate always follows its original immediately.
pub struct SimBus {
    tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,

    /// Receiver (behind tokio mutex for async)
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>>,

    controller: BusController,
}

/// Delivery counters of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    pub published: u64,
    pub duplicated: u64,
}

impl SimBus {
    /// Creates a bus with no fault injection.
    pub fn new(seed: u64) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            controller: BusController::new(seed),
        }
    }

    /// Fault injection knobs.
    pub fn controller(&self) -> &BusController {
        &self.controller
    }

    pub fn stats(&self) -> BusStats {
        self.controller.stats()
    }

    /// Closes the publishing side. Queued envelopes can still be received.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[async_trait]
impl Transport for SimBus {
    fn publish(&self, envelope: Envelope) -> Result<(), EnvError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return Err(EnvError::closed("bus closed"));
        };

        let duplicate = self.controller.roll_duplicate();
        if duplicate {
            tx.send(envelope.clone()).map_err(|_| EnvError::closed("receiver dropped"))?;
        }
        tx.send(envelope).map_err(|_| EnvError::closed("receiver dropped"))?;
        self.controller.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> Option<Envelope> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    fn try_recv(&self) -> Option<Envelope> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }
}

/// Bus controller for fault injection.
pub struct BusController {
    /// Probability that a published envelope is delivered twice (0.0 - 1.0)
    duplicate_rate: Mutex<f64>,

    /// Own RNG, so injection never perturbs the simulation's draws
    rng: Mutex<ChaCha8Rng>,

    published: AtomicU64,
    duplicated: AtomicU64,
}

impl BusController {
    pub fn new(seed: u64) -> Self {
        Self {
            duplicate_rate: Mutex::new(0.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            published: AtomicU64::new(0),
            duplicated: AtomicU64::new(0),
        }
    }

    /// Sets the duplicate delivery rate.
    pub fn set_duplicate_rate(&self, rate: f64) {
        *self.duplicate_rate.lock().unwrap_or_else(PoisonError::into_inner) = rate.clamp(0.0, 1.0);
    }

    pub fn duplicate_rate(&self) -> f64 {
        *self.duplicate_rate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.load(Ordering::Relaxed),
            duplicated: self.duplicated.load(Ordering::Relaxed),
        }
    }

    fn roll_duplicate(&self) -> bool {
        let rate = self.duplicate_rate();
        if rate <= 0.0 {
            return false;
        }
        let hit = self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen::<f64>() < rate;
        if hit {
            self.duplicated.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn env(n: u64) -> Envelope {
        Envelope::new(format!("factory/a/l/st-{n}/status"), vec![n as u8], n)
    }

    fn drain(bus: &SimBus) -> Vec<Envelope> {
        std::iter::from_fn(|| bus.try_recv()).collect()
    }

    #[test]
    fn test_bus_delivers_in_order() {
        let bus = SimBus::new(1);
        for n in 0..5 {
            bus.publish(env(n)).unwrap();
        }
        let got: Vec<u64> = drain(&bus).iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert_eq!(bus.stats(), BusStats { published: 5, duplicated: 0 });
    }

    #[test]
    fn test_full_duplicate_rate_doubles_everything() {
        let bus = SimBus::new(1);
        bus.controller().set_duplicate_rate(1.0);
        bus.publish(env(1)).unwrap();
        bus.publish(env(2)).unwrap();
        let got: Vec<u64> = drain(&bus).iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(got, vec![1, 1, 2, 2]);
        assert_eq!(bus.stats().duplicated, 2);
    }

    #[test]
    fn test_rate_is_clamped() {
        let bus = SimBus::new(1);
        bus.controller().set_duplicate_rate(4.0);
        assert_eq!(bus.controller().duplicate_rate(), 1.0);
        bus.controller().set_duplicate_rate(-1.0);
        assert_eq!(bus.controller().duplicate_rate(), 0.0);
    }

    #[test]
    fn test_closed_bus_rejects_publish_but_drains() {
        let bus = SimBus::new(1);
        bus.publish(env(1)).unwrap();
        bus.close();
        assert!(matches!(bus.publish(env(2)), Err(EnvError::TransportClosed(_))));
        assert_eq!(drain(&bus).len(), 1);
    }

    #[tokio::test]
    async fn test_recv_ends_after_close() {
        let bus = SimBus::new(1);
        bus.publish(env(9)).unwrap();
        bus.close();
        assert_eq!(bus.recv().await.map(|e| e.timestamp_ms), Some(9));
        assert!(bus.recv().await.is_none());
    }

    proptest! {
        #[test]
        fn prop_duplicates_follow_their_original(rate in 0.0f64..=1.0, n in 1u64..60, seed in any::<u64>()) {
            let bus = SimBus::new(seed);
            bus.controller().set_duplicate_rate(rate);
            for i in 0..n {
                bus.publish(env(i)).unwrap();
            }
            let got: Vec<u64> = drain(&bus).iter().map(|e| e.timestamp_ms).collect();

            let mut deduped = got.clone();
            deduped.dedup();
            prop_assert_eq!(deduped, (0..n).collect::<Vec<_>>());
            prop_assert_eq!(got.len() as u64, n + bus.stats().duplicated);
        }
    }
}
