//! JSON exporter for finished runs.
//!
//! Writes the run summary, the final tracker snapshot and the accepted
//! event log, for offline inspection or replay.

use crate::bus::BusStats;
use crate::error::SimError;
use crate::world::{PlantWorld, WorldStats};

use flowtwin_core::{PlantEvent, SimulatorStats, Snapshot};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual duration in seconds
    pub duration_sec: f64,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub simulator: SimulatorStats,
    pub world: WorldStats,
    pub bus: BusStats,

    /// Parts per status, keyed by the wire name of the status
    pub status_counts: BTreeMap<String, usize>,

    pub snapshot: Snapshot,

    /// Accepted events in delivery order
    pub events: Vec<PlantEvent>,
}

impl SimExport {
    /// Captures the final state of `world`.
    pub fn capture(scenario: &str, world: &PlantWorld) -> Self {
        let status_counts = world
            .tracker()
            .status_counts()
            .into_iter()
            .map(|(status, n)| (status_name(&status), n))
            .collect();

        Self {
            scenario: scenario.to_string(),
            seed: world.config.seed,
            duration_sec: world.elapsed().as_secs_f64(),
            passed: false,
            failure_reason: None,
            simulator: world.simulator().stats(),
            world: world.stats(),
            bus: world.bus_stats(),
            status_counts,
            snapshot: world.snapshot(),
            events: world.accepted_events().to_vec(),
        }
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

fn status_name<T: Serialize + std::fmt::Debug>(status: &T) -> String {
    match serde_json::to_value(status) {
        Ok(serde_json::Value::String(name)) => name,
        _ => format!("{status:?}"),
    }
}
