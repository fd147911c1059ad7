//! FlowTwin Environment Abstraction Layer
//!
//! This crate provides the seam that lets the FlowTwin engines run in both
//! **Production** (wall-clock tokio) and **Simulation** (paused tokio clock,
//! seeded RNG) environments.
//!
//! # Core Concept
//!
//! The part agents never call `tokio::time` or `rand::thread_rng` directly.
//! Everything that would make a run non-reproducible is routed through:
//! - Time (`now()`, `sleep()`, `system_time()`)
//! - Randomness (`with_rng()`)
//! - Task spawning (`spawn()`)
//! - Messaging (`Transport`)
//!
//! With a paused runtime and a fixed seed, a factory run is reproducible
//! from its seed number.
//!
//! # Example
//!
//! ```ignore
//! use flowtwin_env::{PlantContext, TokioContext};
//!
//! async fn ticker<Ctx: PlantContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(5)).await;
//!         publish_metrics(ctx.timestamp_ms());
//!     }
//! }
//! ```

mod context;
mod transport;
mod types;
mod error;
mod tokio_impl;

pub use context::PlantContext;
pub use transport::Transport;
pub use types::{epoch_millis, Envelope};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
