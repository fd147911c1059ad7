//! Scenario runner - executes plant scenarios and checks the tracker's
//! invariants once the plant has been shut down.

use crate::error::SimError;
use crate::exporter::SimExport;
use crate::scenarios::ScenarioId;
use crate::world::{PlantWorld, SimConfig};

use flowtwin_core::event::REASON_SENSOR_DATA_CHECK_FAIL;
use flowtwin_core::{
    Command, FactoryLayout, OverrideCommand, PartStatus, PlantEvent, SensorDecision, StationStatus,
};
use flowtwin_env::PlantContext;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Virtual time between two operator override sweeps.
const OVERRIDE_SWEEP: Duration = Duration::from_secs(10);

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the run passed every check
    pub passed: bool,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Every violated check, joined
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioMetrics {
    pub parts_spawned: u64,
    pub parts_resumed: u64,
    pub parts_completed: u64,
    pub parts_scrapped: u64,
    pub parts_tracked: usize,
    pub stopped_on_belt: usize,
    pub events_delivered: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
    pub duplicates_injected: u64,
    pub overrides_accepted: u64,
    pub peak_active: usize,
}

/// Runs plant scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Simulated duration in seconds
    duration_secs: f64,

    /// Plant to run on (standard plant when unset)
    layout: Option<FactoryLayout>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: 120.0,
            layout: None,
        }
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs.max(0.0);
        self
    }

    /// Runs on `layout` instead of the standard plant.
    pub fn with_layout(mut self, layout: FactoryLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.run_with_export(scenario).map(|(result, _)| result)
    }

    /// Runs a scenario and also captures the final state for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        let (config, layout) = self.setup(scenario);

        // Everything that reads the clock runs under the paused runtime;
        // outside it tokio's Instant falls back to wall time.
        let runtime = paused_runtime()?;
        let (world, overrides, elapsed, mut export) = runtime.block_on(async {
            let (world, overrides) = drive(scenario, config.clone(), layout.clone()).await?;
            let elapsed = world.elapsed();
            let export = SimExport::capture(scenario.name(), &world);
            Ok::<_, SimError>((world, overrides, elapsed, export))
        })?;

        let mut violations = check_invariants(&world);
        violations.extend(self.check_scenario(scenario, &world, &overrides, &config, &layout)?);

        let passed = violations.is_empty();
        let failure_reason = (!passed).then(|| violations.join("; "));
        if let Some(reason) = &failure_reason {
            warn!(scenario = scenario.name(), seed = self.seed, %reason, "scenario failed");
        }

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            final_time_secs: elapsed.as_secs_f64(),
            failure_reason: failure_reason.clone(),
            metrics: collect_metrics(&world),
        };
        export.finalize(passed, failure_reason);
        Ok((result, export))
    }

    /// Builds the configuration and plant a scenario runs with.
    fn setup(&self, scenario: ScenarioId) -> (SimConfig, FactoryLayout) {
        let layout = self.layout.clone().unwrap_or_else(FactoryLayout::standard);
        let mut config = SimConfig {
            seed: self.seed,
            duration_secs: self.duration_secs,
            ..SimConfig::default()
        };

        let layout = match scenario {
            ScenarioId::SensorStorm => layout.into_builder().scale_sensor_failures(5.0).build(),
            ScenarioId::OperatorOverride => layout.into_builder().scale_sensor_failures(4.0).build(),
            _ => layout,
        };

        match scenario {
            ScenarioId::ReworkLoop => {
                config.simulator.exit_policy.nok_below = 0.0;
                config.simulator.exit_policy.rework_below = 0.6;
            }
            ScenarioId::Congestion => {
                config.simulator.max_in_flight = 40;
                config.simulator.low_water = 30;
                config.simulator.spawn_delay_low_ms = (200, 500);
                config.simulator.spawn_delay_high_ms = (500, 1000);
            }
            ScenarioId::DuplicateDelivery => config.duplicate_rate = 0.3,
            _ => {}
        }
        (config, layout)
    }

    fn check_scenario(
        &self,
        scenario: ScenarioId,
        world: &PlantWorld,
        overrides: &HashMap<String, u64>,
        config: &SimConfig,
        layout: &FactoryLayout,
    ) -> Result<Vec<String>, SimError> {
        let mut violations = Vec::new();
        let tracker = world.tracker();

        match scenario {
            ScenarioId::SteadyState => {
                let spawned = world.simulator().stats().spawned as usize;
                if tracker.part_count() > spawned {
                    violations.push(format!("tracker knows {} parts, {} spawned", tracker.part_count(), spawned));
                }
            }
            ScenarioId::SensorStorm => {
                for part in tracker.parts() {
                    let Some(stop) = &part.stop else { continue };
                    let failed = stop.sensor_id.as_deref().is_some_and(|sensor| {
                        part.sensor_log
                            .iter()
                            .any(|l| l.sensor_id == sensor && l.decision == SensorDecision::Fail)
                    });
                    if !failed {
                        violations.push(format!("{} stopped without a failed sensor", part.part_id));
                    }
                    if stop.reason != REASON_SENSOR_DATA_CHECK_FAIL {
                        violations.push(format!("{} stopped for {}", part.part_id, stop.reason));
                    }
                }
            }
            ScenarioId::ReworkLoop => {
                for station in tracker.stations() {
                    if station.counters.nok > 0 {
                        violations.push(format!("{} scrapped {} parts at exit", station.station_id, station.counters.nok));
                    }
                }
            }
            ScenarioId::Congestion => {
                let peak = world.stats().peak_active;
                if peak > config.simulator.max_in_flight {
                    violations.push(format!("{} parts in flight, cap {}", peak, config.simulator.max_in_flight));
                }
            }
            ScenarioId::OperatorOverride => {
                let stats = world.stats();
                if stats.overrides_rejected > 0 {
                    violations.push(format!("{} overrides rejected", stats.overrides_rejected));
                }
                if world.simulator().stats().resumed != stats.overrides_accepted {
                    violations.push("resumed agents do not match accepted overrides".to_string());
                }
                for (part_id, overridden_at) in overrides {
                    let Some(part) = tracker.part(part_id) else { continue };
                    let failed_again = part
                        .sensor_log
                        .iter()
                        .any(|l| l.timestamp_ms >= *overridden_at && l.decision == SensorDecision::Fail);
                    if failed_again || part.status == PartStatus::Scrapped {
                        violations.push(format!("{} stopped again after override", part_id));
                    }
                }
            }
            ScenarioId::DuplicateDelivery => {
                if world.bus_stats().duplicated == 0 {
                    violations.push("no duplicates injected".to_string());
                }
                let clean_config = SimConfig {
                    duplicate_rate: 0.0,
                    record_events: false,
                    ..config.clone()
                };
                let runtime = paused_runtime()?;
                let (clean, _) = runtime.block_on(drive(scenario, clean_config, layout.clone()))?;
                if station_counters(&clean) != station_counters(world) {
                    violations.push("station counters differ from a clean run".to_string());
                }
                if status_counts(&clean) != status_counts(world) {
                    violations.push("part statuses differ from a clean run".to_string());
                }
            }
        }
        Ok(violations)
    }
}

/// Builds a current-thread runtime whose clock is paused, so virtual time
/// only advances when every task waits on a timer.
fn paused_runtime() -> Result<tokio::runtime::Runtime, SimError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()?;
    Ok(runtime)
}

/// Runs one world for the configured duration, then shuts it down.
///
/// Returns the world and, for the override scenario, when each part was
/// overridden.
async fn drive(
    scenario: ScenarioId,
    config: SimConfig,
    layout: FactoryLayout,
) -> Result<(PlantWorld, HashMap<String, u64>), SimError> {
    let total = Duration::from_secs_f64(config.duration_secs);
    let mut world = PlantWorld::new(config, layout);
    let mut overrides = HashMap::new();
    world.start();

    if scenario == ScenarioId::OperatorOverride {
        while world.elapsed() < total {
            let chunk = OVERRIDE_SWEEP.min(total - world.elapsed());
            world.run_for(chunk).await;
            for part_id in world.overridable_parts() {
                let command = serde_json::to_vec(&Command::OverridePart(OverrideCommand::new(&part_id)))?;
                let at = world.context.timestamp_ms();
                world.handle_command(&command);
                debug!(part = %part_id, "operator override issued");
                overrides.entry(part_id).or_insert(at);
            }
        }
    } else {
        world.run_for(total).await;
    }

    world.shutdown();
    Ok((world, overrides))
}

/// Checks that hold for every scenario once the plant is shut down.
pub fn check_invariants(world: &PlantWorld) -> Vec<String> {
    let mut violations = Vec::new();
    let tracker = world.tracker();

    let held = world.simulator().locks().held_count();
    if held > 0 {
        violations.push(format!("{} locks still held after shutdown", held));
    }

    let mut stations: Vec<_> = tracker.stations().collect();
    stations.sort_by(|a, b| a.station_id.cmp(&b.station_id));
    for station in stations {
        let c = station.counters;
        if c.ok + c.nok + c.rework != c.output {
            violations.push(format!("{} counters inconsistent: {:?}", station.station_id, c));
        }
        if station.current_part_id.is_some() && station.status != StationStatus::Running {
            violations.push(format!("{} holds a part while {:?}", station.station_id, station.status));
        }
    }

    for part in tracker.parts() {
        let open = part.open_entries();
        if open > 1 {
            violations.push(format!("{} has {} open visits", part.part_id, open));
        }
        if part.is_terminal() && open > 0 {
            violations.push(format!("{} is {:?} with an open visit", part.part_id, part.status));
        }
    }

    violations.extend(check_station_exclusion(world.accepted_events()));
    violations
}

/// Replays accepted enters and exits: a station never admits a second part
/// before the first has left.
pub fn check_station_exclusion(events: &[PlantEvent]) -> Vec<String> {
    let mut violations = Vec::new();
    let mut occupant: HashMap<&str, &str> = HashMap::new();
    for event in events {
        match event {
            PlantEvent::PartEnter(e) => {
                if let Some(prev) = occupant.insert(&e.station_id, &e.part_id) {
                    violations.push(format!("{} entered {} while {} held it", e.part_id, e.station_id, prev));
                }
            }
            PlantEvent::PartExit(e) => {
                if occupant.get(e.station_id.as_str()) == Some(&e.part_id.as_str()) {
                    occupant.remove(e.station_id.as_str());
                }
            }
            _ => {}
        }
    }
    violations
}

fn collect_metrics(world: &PlantWorld) -> ScenarioMetrics {
    let sim = world.simulator().stats();
    let stats = world.stats();
    ScenarioMetrics {
        parts_spawned: sim.spawned,
        parts_resumed: sim.resumed,
        parts_completed: sim.completed,
        parts_scrapped: sim.scrapped,
        parts_tracked: world.tracker().part_count(),
        stopped_on_belt: world.overridable_parts().len(),
        events_delivered: stats.delivered,
        events_accepted: stats.accepted,
        events_rejected: stats.rejected,
        duplicates_injected: world.bus_stats().duplicated,
        overrides_accepted: stats.overrides_accepted,
        peak_active: stats.peak_active,
    }
}

fn station_counters(world: &PlantWorld) -> BTreeMap<String, (u64, u64, u64, u64)> {
    world
        .tracker()
        .stations()
        .map(|s| {
            let c = s.counters;
            (s.station_id.clone(), (c.output, c.ok, c.nok, c.rework))
        })
        .collect()
}

fn status_counts(world: &PlantWorld) -> BTreeMap<String, PartStatus> {
    world
        .tracker()
        .parts()
        .map(|p| (p.part_id.clone(), p.status))
        .collect()
}
