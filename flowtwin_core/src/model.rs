//! Plant data model: parts, stations, sensors and their closed type enums.
//!
//! Configuration types (`StationConfig`, `SensorConfig`, ...) describe the
//! static topology. Runtime types (`Part`, `StationState`, `SensorState`)
//! are owned and mutated only by the `StateTracker`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ring::MetricRing;

// ============================================================================
// CLOSED TYPE ENUMS
// ============================================================================

/// Lifecycle status of a part. `Completed` and `Scrapped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    InStation,
    InTransit,
    Completed,
    Scrapped,
}

impl PartStatus {
    /// Terminal parts accept no further lifecycle mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, PartStatus::Completed | PartStatus::Scrapped)
    }
}

/// Operational status of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Idle,
    Running,
    Error,
    Offline,
}

/// Verdict a station hands out when a part leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitResult {
    Ok,
    Nok,
    Rework,
}

/// Kind of processing a station performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationType {
    Load,
    Machine,
    Buffer,
    Measure,
    Inspection,
    Pack,
    Manual,
}

/// Static description of one telemetry channel a station publishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub metric_id: &'static str,
    pub unit: &'static str,
    pub base_value: f64,
    pub variance: f64,
}

const LOAD_METRICS: &[MetricSpec] = &[MetricSpec { metric_id: "weight", unit: "kg", base_value: 5.0, variance: 0.8 }];

const MACHINE_METRICS: &[MetricSpec] = &[
    MetricSpec { metric_id: "vibration", unit: "mm/s", base_value: 2.5, variance: 2.0 },
    MetricSpec { metric_id: "power", unit: "kW", base_value: 10.0, variance: 5.0 },
    MetricSpec { metric_id: "temperature", unit: "celsius", base_value: 62.0, variance: 12.0 },
];

const MEASURE_METRICS: &[MetricSpec] = &[
    MetricSpec { metric_id: "dimension", unit: "mm", base_value: 100.0, variance: 0.4 },
    MetricSpec { metric_id: "accuracy", unit: "%", base_value: 99.2, variance: 2.0 },
];

const INSPECTION_METRICS: &[MetricSpec] = &[
    MetricSpec { metric_id: "score", unit: "pts", base_value: 92.0, variance: 10.0 },
    MetricSpec { metric_id: "defects", unit: "pcs", base_value: 1.0, variance: 2.0 },
];

const MANUAL_METRICS: &[MetricSpec] = &[MetricSpec { metric_id: "temperature", unit: "celsius", base_value: 22.0, variance: 4.0 }];

const PACK_METRICS: &[MetricSpec] = &[MetricSpec { metric_id: "weight", unit: "kg", base_value: 10.0, variance: 0.7 }];

impl StationType {
    /// Default processing-time range `[min, max]` in milliseconds.
    pub fn processing_time_ms(self) -> (u64, u64) {
        match self {
            StationType::Load => (3000, 6000),
            StationType::Machine => (8000, 20000),
            StationType::Buffer => (2000, 4000),
            StationType::Measure => (5000, 12000),
            StationType::Inspection => (4000, 10000),
            StationType::Pack => (3000, 8000),
            StationType::Manual => (5000, 15000),
        }
    }

    /// Human-readable name used when generating layouts.
    pub fn display_name(self) -> &'static str {
        match self {
            StationType::Load => "Loading Dock",
            StationType::Machine => "CNC Machine",
            StationType::Buffer => "Buffer Zone",
            StationType::Measure => "Quality Check",
            StationType::Inspection => "Final Inspection",
            StationType::Pack => "Packing Station",
            StationType::Manual => "Manual Station",
        }
    }

    /// Identifier fragment used in generated station ids.
    pub fn slug(self) -> &'static str {
        match self {
            StationType::Load => "load",
            StationType::Machine => "machine",
            StationType::Buffer => "buffer",
            StationType::Measure => "measure",
            StationType::Inspection => "inspection",
            StationType::Pack => "pack",
            StationType::Manual => "manual",
        }
    }

    /// Only measuring stations roll a pass/fail/rework verdict.
    pub fn rolls_verdict(self) -> bool {
        matches!(self, StationType::Measure)
    }

    /// Telemetry channels published for this station type.
    pub fn metrics(self) -> &'static [MetricSpec] {
        match self {
            StationType::Load => LOAD_METRICS,
            StationType::Machine => MACHINE_METRICS,
            StationType::Buffer => &[],
            StationType::Measure => MEASURE_METRICS,
            StationType::Inspection => INSPECTION_METRICS,
            StationType::Manual => MANUAL_METRICS,
            StationType::Pack => PACK_METRICS,
        }
    }
}

/// Kind of belt sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    DataCheck,
    Routing,
    ProcessDecision,
}

/// Outcome of a sensor evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorDecision {
    Pass,
    Fail,
    Rework,
    SkipProcess,
}

// ============================================================================
// TOPOLOGY CONFIGURATION
// ============================================================================

/// Position of a station on the floor plan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Static configuration of a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationConfig {
    pub station_id: String,
    pub display_id: String,
    pub name: String,
    pub area: String,
    pub line: String,
    #[serde(rename = "type")]
    pub station_type: StationType,
    pub position: Position,
    /// Downstream stations (usually one, several for parallel paths)
    pub next_stations: Vec<String>,
    /// Where a `rework` verdict sends the part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rework_target: Option<String>,
    /// Processing time range `[min, max]` in ms
    #[serde(rename = "processingTime")]
    pub processing_time_ms: (u64, u64),
}

/// Static configuration of a belt sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    pub sensor_id: String,
    pub display_id: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub from_station_id: String,
    pub to_station_id: String,
    /// Fractional position along the belt, 0.0 to 1.0
    pub position_on_belt: f64,
    /// Probability of a negative outcome, 0.0 to 1.0
    pub fail_probability: f64,
}

/// An ordered production line; the first station is the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    pub line_id: String,
    pub area: String,
    pub name: String,
    pub stations: Vec<String>,
}

/// A manufacturing area grouping several lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaConfig {
    pub area_id: String,
    pub name: String,
    pub lines: Vec<LineConfig>,
}

// ============================================================================
// RUNTIME STATE
// ============================================================================

/// One visit of a part to a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub station_id: String,
    pub area: String,
    pub line: String,
    pub entered_at_ms: u64,
    pub exited_at_ms: Option<u64>,
    pub result: Option<ExitResult>,
    pub cycle_time_ms: Option<u64>,
    pub progress_pct: f64,
}

impl HistoryEntry {
    /// An entry is open until its exit has been recorded.
    pub fn is_open(&self) -> bool {
        self.exited_at_ms.is_none()
    }
}

/// One sensor outcome observed for a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorLogEntry {
    pub sensor_id: String,
    pub decision: SensorDecision,
    pub timestamp_ms: u64,
    pub from_station_id: String,
    pub to_station_id: String,
}

/// Where a part came to rest on a belt after a data-check failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInfo {
    pub from_station_id: String,
    pub to_station_id: String,
    pub sensor_id: Option<String>,
    pub reason: String,
    pub stopped_at_ms: u64,
}

/// Canonical record of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub part_id: String,
    pub created_at_ms: u64,
    pub status: PartStatus,
    pub current_station: Option<String>,
    pub current_area: Option<String>,
    pub current_line: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub sensor_log: Vec<SensorLogEntry>,
    /// Set while the part is stopped on a belt and can be overridden
    pub stop: Option<StopInfo>,
}

impl Part {
    /// Creates a part first seen entering `station_id`.
    pub fn new(part_id: &str, created_at_ms: u64) -> Self {
        Self {
            part_id: part_id.to_string(),
            created_at_ms,
            status: PartStatus::InStation,
            current_station: None,
            current_area: None,
            current_line: None,
            history: Vec::new(),
            sensor_log: Vec::new(),
            stop: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Most recent open history entry for `station_id`, searched backwards.
    pub fn open_entry_mut(&mut self, station_id: &str) -> Option<&mut HistoryEntry> {
        self.history
            .iter_mut()
            .rev()
            .find(|h| h.station_id == station_id && h.is_open())
    }

    /// Number of history entries without an exit.
    pub fn open_entries(&self) -> usize {
        self.history.iter().filter(|h| h.is_open()).count()
    }
}

/// Result counters of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationCounters {
    pub output: u64,
    pub ok: u64,
    pub nok: u64,
    pub rework: u64,
}

impl StationCounters {
    pub fn record(&mut self, result: ExitResult) {
        self.output += 1;
        match result {
            ExitResult::Ok => self.ok += 1,
            ExitResult::Nok => self.nok += 1,
            ExitResult::Rework => self.rework += 1,
        }
    }
}

/// Latest value of the well-known metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMetrics {
    pub temperature: Option<f64>,
    pub cycle_time: Option<f64>,
    pub output_count: Option<f64>,
}

/// Runtime state of a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationState {
    pub station_id: String,
    pub status: StationStatus,
    pub current_part_id: Option<String>,
    pub counters: StationCounters,
    pub metrics: StationMetrics,
    /// Bounded sample history per metric id
    pub history: HashMap<String, MetricRing>,
}

impl StationState {
    pub fn new(station_id: &str) -> Self {
        Self {
            station_id: station_id.to_string(),
            status: StationStatus::Idle,
            current_part_id: None,
            counters: StationCounters::default(),
            metrics: StationMetrics::default(),
            history: HashMap::new(),
        }
    }
}

/// Runtime state of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    pub sensor_id: String,
    pub last_triggered_at_ms: Option<u64>,
    pub last_decision: Option<SensorDecision>,
    pub last_part_id: Option<String>,
    /// Observational only: the sensor shows as active until this time
    pub active_until_ms: Option<u64>,
}

impl SensorState {
    pub fn new(sensor_id: &str) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            last_triggered_at_ms: None,
            last_decision: None,
            last_part_id: None,
            active_until_ms: None,
        }
    }

    pub fn is_active(&self, now_ms: u64) -> bool {
        self.active_until_ms.is_some_and(|until| now_ms < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(PartStatus::Completed.is_terminal());
        assert!(PartStatus::Scrapped.is_terminal());
        assert!(!PartStatus::InStation.is_terminal());
        assert!(!PartStatus::InTransit.is_terminal());
    }

    #[test]
    fn test_only_measure_rolls_verdict() {
        let all = [
            StationType::Load,
            StationType::Machine,
            StationType::Buffer,
            StationType::Measure,
            StationType::Inspection,
            StationType::Pack,
            StationType::Manual,
        ];
        let rolling: Vec<_> = all.iter().filter(|t| t.rolls_verdict()).collect();
        assert_eq!(rolling, vec![&StationType::Measure]);
        for t in all {
            let (min, max) = t.processing_time_ms();
            assert!(min <= max);
        }
        assert!(StationType::Buffer.metrics().is_empty());
    }

    #[test]
    fn test_counters_record() {
        let mut c = StationCounters::default();
        c.record(ExitResult::Ok);
        c.record(ExitResult::Nok);
        c.record(ExitResult::Rework);
        c.record(ExitResult::Ok);
        assert_eq!(c.output, 4);
        assert_eq!(c.ok, 2);
        assert_eq!(c.nok, 1);
        assert_eq!(c.rework, 1);
    }

    #[test]
    fn test_open_entry_search_is_backwards() {
        let mut part = Part::new("P-1", 0);
        for (station, entered, exited) in [("a", 1, None), ("b", 2, Some(3)), ("a", 4, None)] {
            part.history.push(HistoryEntry {
                station_id: station.to_string(),
                area: "x".into(),
                line: "l".into(),
                entered_at_ms: entered,
                exited_at_ms: exited,
                result: None,
                cycle_time_ms: None,
                progress_pct: 0.0,
            });
        }
        let entry = part.open_entry_mut("a").unwrap();
        assert_eq!(entry.entered_at_ms, 4);
        assert!(part.open_entry_mut("b").is_none());
        assert_eq!(part.open_entries(), 2);
    }

    #[test]
    fn test_sensor_activity_window() {
        let mut s = SensorState::new("s1");
        assert!(!s.is_active(0));
        s.active_until_ms = Some(2000);
        assert!(s.is_active(1999));
        assert!(!s.is_active(2000));
    }

    #[test]
    fn test_station_config_wire_shape() {
        let cfg = StationConfig {
            station_id: "aa-measure-1-05".into(),
            display_id: "1005".into(),
            name: "Quality Check AA-1-05".into(),
            area: "assembly-a".into(),
            line: "line-aa1".into(),
            station_type: StationType::Measure,
            position: Position { x: 1.0, y: 2.0 },
            next_stations: vec!["aa-machine-1-06".into()],
            rework_target: Some("aa-machine-1-03".into()),
            processing_time_ms: (5000, 12000),
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["type"], "measure");
        assert_eq!(json["reworkTarget"], "aa-machine-1-03");
        assert_eq!(json["processingTime"][1], 12000);
        let back: StationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
