//! FlowTwin Deterministic Simulation Harness
//!
//! This crate runs the whole digital twin (flow simulator, plant bus,
//! state tracker, operator overrides) inside a controlled environment
//! where a run is reproducible from its seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a paused tokio clock that only moves when every task waits
//! - **Delivery**: an in-memory bus with seeded duplicate injection
//! - **Randomness**: all draws come from one ChaCha8 stream per seed
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        PlantWorld                          │
//! │  ┌───────────────┐  events   ┌────────┐  envelopes         │
//! │  │ FlowSimulator │──────────►│ SimBus │──────────┐         │
//! │  │  PartAgent *  │           └────────┘          ▼         │
//! │  └───────▲───────┘                       ┌──────────────┐  │
//! │          │ resume                        │ StateTracker │  │
//! │  ┌───────┴──────────────┐   reads        └──────▲───────┘  │
//! │  │ OverrideOrchestrator │───────────────────────┘          │
//! │  └──────────────────────┘                                  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use flowtwin_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(300.0)
//!     .run(ScenarioId::OperatorOverride)?;
//! assert!(result.passed);
//! ```

mod bus;
mod context;
mod error;
mod exporter;
mod runner;
mod world;
pub mod scenarios;

pub use bus::{BusController, BusStats, SimBus};
pub use context::SimContext;
pub use error::SimError;
pub use exporter::SimExport;
pub use runner::{check_invariants, check_station_exclusion, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{PlantWorld, SimConfig, WorldStats};
