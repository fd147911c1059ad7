//! PlantWorld - The simulation harness container.

use crate::bus::{BusStats, SimBus};
use crate::context::SimContext;

use flowtwin_core::codec;
use flowtwin_core::{
    Command, CommandResponse, EventSink, FactoryLayout, FlowSimulator, OverrideOrchestrator, PlantEvent,
    SimulatorConfig, Snapshot, StateTracker, TrackerConfig, TransportSink,
};
use flowtwin_env::{PlantContext, Transport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Simulated duration in seconds
    pub duration_secs: f64,

    /// Virtual time between two bus pumps
    pub step_ms: u64,

    /// Probability that the bus delivers an envelope twice
    pub duplicate_rate: f64,

    /// Keep accepted events for export
    pub record_events: bool,

    pub simulator: SimulatorConfig,
    pub tracker: TrackerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration_secs: 120.0,
            step_ms: 250,
            duplicate_rate: 0.0,
            record_events: true,
            simulator: SimulatorConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

/// Delivery and command counters of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldStats {
    pub delivered: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub malformed: u64,
    pub overrides_accepted: u64,
    pub overrides_rejected: u64,
    pub peak_active: usize,
}

/// The PlantWorld - simulator, bus, tracker and operator path in one place.
///
/// Producers publish on the bus through a `TransportSink`; `pump()` moves
/// whatever is queued into the tracker. Nothing reaches the tracker except
/// through the codec.
pub struct PlantWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock + RNG)
    pub context: Arc<SimContext>,

    /// Plant bus with fault injection
    pub bus: Arc<SimBus>,

    simulator: Arc<FlowSimulator<SimContext>>,
    orchestrator: OverrideOrchestrator<SimContext>,
    tracker: StateTracker,
    accepted: Vec<PlantEvent>,
    stats: WorldStats,
}

impl PlantWorld {
    /// Creates a world over `layout`. Must be called inside a tokio runtime.
    pub fn new(config: SimConfig, layout: FactoryLayout) -> Self {
        // Separate streams so bus faults never shift the plant's draws
        let context_seed = config.seed;
        let bus_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(context_seed);
        let bus = Arc::new(SimBus::new(bus_seed));
        bus.controller().set_duplicate_rate(config.duplicate_rate);

        let layout = Arc::new(layout);
        let sink: Arc<dyn EventSink> = Arc::new(TransportSink::new(bus.clone()));
        let simulator = Arc::new(FlowSimulator::new(
            context.clone(),
            layout.clone(),
            sink.clone(),
            config.simulator.clone(),
        ));
        let orchestrator = OverrideOrchestrator::new(context.clone(), simulator.clone(), sink);
        let tracker = StateTracker::new(layout, config.tracker.clone());

        Self {
            config,
            context,
            bus,
            simulator,
            orchestrator,
            tracker,
            accepted: Vec::new(),
            stats: WorldStats::default(),
        }
    }

    /// Starts the flow simulator.
    pub fn start(&self) {
        self.simulator.start();
    }

    /// Delivers every queued envelope to the tracker. Returns how many were
    /// delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(envelope) = self.bus.try_recv() {
            delivered += 1;
            self.stats.delivered += 1;
            let Some(event) = codec::decode(&envelope) else {
                debug!(topic = %envelope.topic, "dropping malformed envelope");
                self.stats.malformed += 1;
                continue;
            };
            if self.tracker.apply(&event) {
                self.stats.accepted += 1;
                if self.config.record_events {
                    self.accepted.push(event);
                }
            } else {
                self.stats.rejected += 1;
            }
        }
        self.stats.peak_active = self.stats.peak_active.max(self.simulator.active_count());
        delivered
    }

    /// Runs for `duration` of virtual time, pumping after every step.
    pub async fn run_for(&mut self, duration: Duration) {
        let deadline = self.context.now() + duration;
        let step = Duration::from_millis(self.config.step_ms.max(1));
        while self.context.now() < deadline {
            let remaining = deadline.saturating_sub(self.context.now());
            self.context.sleep(step.min(remaining)).await;
            self.pump();
        }
    }

    /// Handles a JSON operator command. Malformed commands yield `None`.
    pub fn handle_command(&mut self, bytes: &[u8]) -> Option<CommandResponse> {
        let command = Command::decode(bytes)?;
        self.pump();

        let response = match command {
            Command::OverridePart(cmd) => {
                let part_id = cmd.part_id.clone();
                if self.orchestrator.handle(&self.tracker, &cmd).is_some() {
                    self.stats.overrides_accepted += 1;
                    CommandResponse::OverrideAccepted { part_id }
                } else {
                    self.stats.overrides_rejected += 1;
                    CommandResponse::OverrideRejected { part_id }
                }
            }
            Command::GetPartHistory { part_id } => CommandResponse::PartHistory(self.tracker.part_history(&part_id)),
            Command::SearchPart { query } => CommandResponse::SearchResults(self.tracker.search_parts(&query)),
        };
        Some(response)
    }

    /// Parts currently stopped on a belt, sorted.
    pub fn overridable_parts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tracker
            .parts()
            .filter(|p| self.tracker.can_override(&p.part_id))
            .map(|p| p.part_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Destroys every agent and drains what they published before dying.
    pub fn shutdown(&mut self) {
        self.simulator.stop();
        self.pump();
    }

    pub fn snapshot(&self) -> Snapshot {
        self.tracker.snapshot(self.context.timestamp_ms())
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn simulator(&self) -> &Arc<FlowSimulator<SimContext>> {
        &self.simulator
    }

    /// Accepted events in delivery order (empty unless `record_events`).
    pub fn accepted_events(&self) -> &[PlantEvent] {
        &self.accepted
    }

    pub fn stats(&self) -> WorldStats {
        self.stats
    }

    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// Virtual time elapsed since the world was created.
    pub fn elapsed(&self) -> Duration {
        self.context.now()
    }
}
