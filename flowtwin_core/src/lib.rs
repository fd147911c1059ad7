//! FlowTwin Core - production-line digital twin engines
//!
//! This library provides the two halves of a factory digital twin:
//!
//! - **Flow Simulator**: per-part state machines that contend for stations
//!   and belt segments, run timed processing phases, evaluate belt sensors
//!   and route parts forward, to rework, or out of the line.
//! - **State Tracker**: the canonical Part/Station/Sensor record, reduced
//!   from the event stream the simulator produces.
//!
//! An operator override path resumes parts stopped by a failed data check.
//!
//! # Modules
//!
//! - `model` / `layout` - static topology and runtime record types
//! - `locks` - Resource Lock Manager
//! - `sensor` / `routing` - sensor decisions, exit verdicts and next hops
//! - `agent` / `simulator` - part agents and the flow simulator
//! - `tracker` / `ring` - the state reducer and bounded metric history
//! - `resume` / `command` - operator commands and the override orchestrator
//! - `event` / `codec` / `sink` - the event contract and its transport

pub mod agent;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod layout;
pub mod locks;
pub mod model;
pub mod resume;
pub mod ring;
pub mod routing;
pub mod sensor;
pub mod simulator;
pub mod sink;
pub mod tracker;

pub use agent::{AgentMode, Outcome, PartAgent, PartHandle, PartState};
pub use command::{Command, CommandResponse, OverrideCommand};
pub use config::{ExitPolicy, SimulatorConfig, Timing};
pub use error::LayoutError;
pub use event::{EventKind, PlantEvent};
pub use layout::{FactoryLayout, LayoutBuilder, Route};
pub use locks::{BeltKey, LockGuard, LockManager, ResourceKey};
pub use model::{
    ExitResult, Part, PartStatus, SensorConfig, SensorDecision, SensorType, StationConfig, StationState,
    StationStatus, StationType,
};
pub use resume::OverrideOrchestrator;
pub use ring::{MetricRing, MetricSample};
pub use simulator::{FlowSimulator, SimulatorStats};
pub use sink::{EventSink, MemorySink, TransportSink};
pub use tracker::{Snapshot, StateTracker, TrackerConfig};
