//! Production implementation of PlantContext using Tokio.

use crate::PlantContext;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Production context backed by Tokio and OS entropy.
///
/// Time comes from the tokio clock (so a paused test runtime still works),
/// timestamps from the system clock, randomness from an entropy-seeded
/// `StdRng` unless a seed is given.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Seed the RNG was built from (0 = entropy)
    seed: u64,

    rng: Mutex<StdRng>,
}

impl TokioContext {
    /// Creates a new TokioContext seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            seed: 0,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Creates a context with a fixed RNG seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            start: Instant::now(),
            seed,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlantContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string(); // Would be used for tracing
        tokio::spawn(future)
    }

    fn with_rng<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut dyn RngCore) -> T,
    {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *rng)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}
