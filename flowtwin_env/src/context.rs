//! Core environment context trait for FlowTwin engines.

use async_trait::async_trait;
use rand::{Rng, RngCore};
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

use crate::types::epoch_millis;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the part agents and the
/// flow simulator can run against wall-clock time in production and against
/// a paused, seeded runtime in simulation and tests.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, entropy-seeded RNG
/// - **Simulation**: `SimContext` - paused tokio clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// Every source of non-determinism the engines touch (time, randomness,
/// task spawning) goes through this trait.
#[async_trait]
pub trait PlantContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for event timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// This is the only suspension point the engines use, so a cancelled
    /// task always stops inside one of these calls.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task and returns its handle.
    ///
    /// The handle is what makes a part agent cancellable: aborting it drops
    /// the task's future along with every lock guard it owns.
    fn spawn<F>(&self, name: &str, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static;

    /// Runs `f` with exclusive access to the context's random generator.
    fn with_rng<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut dyn RngCore) -> T;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// Unseeded production contexts return 0.
    fn seed(&self) -> u64;

    /// Wall-clock time as milliseconds since the Unix epoch.
    fn timestamp_ms(&self) -> u64 {
        epoch_millis(self.system_time())
    }

    /// Uniform sample in `[0, 1)`.
    fn random_unit(&self) -> f64 {
        self.with_rng(|rng| rng.gen::<f64>())
    }

    /// Uniform integer in `[min, max]` (inclusive). Returns `min` if the
    /// range is empty.
    fn random_between(&self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.with_rng(|rng| rng.gen_range(min..=max))
    }

    /// Uniform index in `[0, len)`. `len` must be non-zero.
    fn random_index(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.with_rng(|rng| rng.gen_range(0..len))
    }
}
