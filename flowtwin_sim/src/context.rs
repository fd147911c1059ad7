//! Simulation context implementing PlantContext for deterministic runs.

use async_trait::async_trait;
use flowtwin_env::PlantContext;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Simulation context backed by the tokio clock and a seeded RNG.
///
/// This implements `PlantContext` using:
/// - The tokio clock, so on a paused runtime time only moves when every
///   task is blocked on a timer
/// - A seeded ChaCha8 RNG shared by every part agent
/// - A fixed epoch, so event timestamps are reproducible too
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Virtual time 0
    start: Instant,

    /// Deterministic RNG for every draw the engines make
    rng: Arc<Mutex<ChaCha8Rng>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start: Instant::now(),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Wall-clock time that virtual time 0 maps to.
    pub fn epoch(&self) -> SystemTime {
        self.epoch
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            start: self.start,
            rng: Arc::clone(&self.rng),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl PlantContext for SimContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, _name: &str, future: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
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
