//! Domain events: the contract between event producers (part agents, the
//! flow simulator, the override orchestrator) and the `StateTracker`.
//!
//! Every event carries the ids and the emission timestamp needed to replay
//! the transition, plus the area/line it happened on (used for topic routing).
//! Payload field names follow the wire format (camelCase, `timestamp`).

use serde::{Deserialize, Serialize};

use crate::model::{ExitResult, SensorDecision, SensorType, StationStatus};

/// `TransitStop` reason for a part stopped by a data-check sensor.
pub const REASON_SENSOR_DATA_CHECK_FAIL: &str = "sensor_data_check_fail";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartEnter {
    pub part_id: String,
    pub station_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartExit {
    pub part_id: String,
    pub station_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    pub result: ExitResult,
    pub cycle_time_ms: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartProcess {
    pub part_id: String,
    pub station_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    pub progress_pct: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatusUpdate {
    pub station_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    pub status: StationStatus,
    #[serde(default)]
    pub current_part_id: Option<String>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricReading {
    pub station_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    #[serde(default)]
    pub metric_id: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitStart {
    pub part_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    pub from_station_id: String,
    pub to_station_id: String,
    pub transit_time_ms: u64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitStop {
    pub part_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    pub from_station_id: String,
    pub to_station_id: String,
    pub reason: String,
    /// Sensor that stopped the part, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorTrigger {
    #[serde(default)]
    pub sensor_id: String,
    pub part_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    pub decision: SensorDecision,
    pub from_station_id: String,
    pub to_station_id: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartOverride {
    pub part_id: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub line: String,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
}

/// A plant event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PlantEvent {
    PartEnter(PartEnter),
    PartExit(PartExit),
    PartProcess(PartProcess),
    StationStatus(StationStatusUpdate),
    Metric(MetricReading),
    TransitStart(TransitStart),
    TransitStop(TransitStop),
    SensorTrigger(SensorTrigger),
    PartOverride(PartOverride),
}

/// Discriminant tag for event types, used for counting and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PartEnter,
    PartExit,
    PartProcess,
    StationStatus,
    Metric,
    TransitStart,
    TransitStop,
    SensorTrigger,
    PartOverride,
}

impl PlantEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlantEvent::PartEnter(_) => EventKind::PartEnter,
            PlantEvent::PartExit(_) => EventKind::PartExit,
            PlantEvent::PartProcess(_) => EventKind::PartProcess,
            PlantEvent::StationStatus(_) => EventKind::StationStatus,
            PlantEvent::Metric(_) => EventKind::Metric,
            PlantEvent::TransitStart(_) => EventKind::TransitStart,
            PlantEvent::TransitStop(_) => EventKind::TransitStop,
            PlantEvent::SensorTrigger(_) => EventKind::SensorTrigger,
            PlantEvent::PartOverride(_) => EventKind::PartOverride,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            PlantEvent::PartEnter(e) => e.timestamp_ms,
            PlantEvent::PartExit(e) => e.timestamp_ms,
            PlantEvent::PartProcess(e) => e.timestamp_ms,
            PlantEvent::StationStatus(e) => e.timestamp_ms,
            PlantEvent::Metric(e) => e.timestamp_ms,
            PlantEvent::TransitStart(e) => e.timestamp_ms,
            PlantEvent::TransitStop(e) => e.timestamp_ms,
            PlantEvent::SensorTrigger(e) => e.timestamp_ms,
            PlantEvent::PartOverride(e) => e.timestamp_ms,
        }
    }

    /// The part this event concerns, if any.
    pub fn part_id(&self) -> Option<&str> {
        match self {
            PlantEvent::PartEnter(e) => Some(&e.part_id),
            PlantEvent::PartExit(e) => Some(&e.part_id),
            PlantEvent::PartProcess(e) => Some(&e.part_id),
            PlantEvent::StationStatus(e) => e.current_part_id.as_deref(),
            PlantEvent::Metric(_) => None,
            PlantEvent::TransitStart(e) => Some(&e.part_id),
            PlantEvent::TransitStop(e) => Some(&e.part_id),
            PlantEvent::SensorTrigger(e) => Some(&e.part_id),
            PlantEvent::PartOverride(e) => Some(&e.part_id),
        }
    }

    /// `(area, line)` the event belongs to.
    pub fn area_line(&self) -> (&str, &str) {
        match self {
            PlantEvent::PartEnter(e) => (&e.area, &e.line),
            PlantEvent::PartExit(e) => (&e.area, &e.line),
            PlantEvent::PartProcess(e) => (&e.area, &e.line),
            PlantEvent::StationStatus(e) => (&e.area, &e.line),
            PlantEvent::Metric(e) => (&e.area, &e.line),
            PlantEvent::TransitStart(e) => (&e.area, &e.line),
            PlantEvent::TransitStop(e) => (&e.area, &e.line),
            PlantEvent::SensorTrigger(e) => (&e.area, &e.line),
            PlantEvent::PartOverride(e) => (&e.area, &e.line),
        }
    }
}
