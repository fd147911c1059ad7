//! State Tracker: the canonical Part/Station/Sensor record.
//!
//! The tracker is a reducer over `PlantEvent`s. Each handler validates the
//! event against the current state and either applies it and returns
//! `true`, or rejects it with no effect and returns `false`. Rejections are
//! ordinary data (duplicates, late events for terminal parts, unknown ids),
//! never errors.
//!
//! # Invariants
//!
//! - A `Completed` or `Scrapped` part accepts no further lifecycle event.
//!   The only way out of `Scrapped` is an operator override of a part that
//!   was stopped on a belt.
//! - A station reports a current part only while `Running`.
//! - Open history entries are located by backward search, never by
//!   position, so interleaved delivery across parts is harmless.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::event::*;
use crate::layout::FactoryLayout;
use crate::model::{
    ExitResult, HistoryEntry, Part, PartStatus, SensorDecision, SensorLogEntry, SensorState, StationState,
    StationStatus, StopInfo,
};
use crate::ring::{MetricRing, MetricSample, DEFAULT_METRIC_CAPACITY};

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Samples retained per station metric (default: 60)
    pub metric_capacity: usize,

    /// How long a sensor shows as active after a trigger (default: 2000 ms)
    pub sensor_active_window_ms: u64,

    /// Maximum number of search results (default: 20)
    pub search_limit: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            metric_capacity: DEFAULT_METRIC_CAPACITY,
            sensor_active_window_ms: 2000,
            search_limit: 20,
        }
    }
}

/// Accept/reject counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Sensor state as presented to observers, with derived activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorView {
    #[serde(flatten)]
    pub state: SensorState,
    pub is_active: bool,
}

/// Full current state plus topology, built on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub taken_at_ms: u64,
    pub parts: Vec<Part>,
    pub stations: HashMap<String, StationState>,
    pub sensors: HashMap<String, SensorView>,
    pub layout: FactoryLayout,
}

/// The canonical state reducer.
#[derive(Debug)]
pub struct StateTracker {
    layout: Arc<FactoryLayout>,
    config: TrackerConfig,
    parts: HashMap<String, Part>,
    stations: HashMap<String, StationState>,
    sensors: HashMap<String, SensorState>,
    stats: TrackerStats,
}

impl StateTracker {
    /// Creates a tracker with one idle state per station and one state per
    /// sensor of `layout`.
    pub fn new(layout: Arc<FactoryLayout>, config: TrackerConfig) -> Self {
        let stations = layout
            .stations
            .keys()
            .map(|id| (id.clone(), StationState::new(id)))
            .collect();
        let sensors = layout
            .sensors
            .iter()
            .map(|s| (s.sensor_id.clone(), SensorState::new(&s.sensor_id)))
            .collect();
        Self {
            layout,
            config,
            parts: HashMap::new(),
            stations,
            sensors,
            stats: TrackerStats::default(),
        }
    }

    pub fn layout(&self) -> &Arc<FactoryLayout> {
        &self.layout
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// Applies one event. Returns whether it was accepted.
    pub fn apply(&mut self, event: &PlantEvent) -> bool {
        let accepted = match event {
            PlantEvent::PartEnter(e) => self.handle_part_enter(e),
            PlantEvent::PartExit(e) => self.handle_part_exit(e),
            PlantEvent::PartProcess(e) => self.handle_part_process(e),
            PlantEvent::StationStatus(e) => self.handle_station_status(e),
            PlantEvent::Metric(e) => self.handle_metric(e),
            PlantEvent::TransitStart(e) => self.handle_transit_start(e),
            PlantEvent::TransitStop(e) => self.handle_transit_stop(e),
            PlantEvent::SensorTrigger(e) => self.handle_sensor_trigger(e),
            PlantEvent::PartOverride(e) => self.handle_part_override(e).is_some(),
        };
        if accepted {
            self.stats.accepted += 1;
        } else {
            self.stats.rejected += 1;
            debug!(kind = ?event.kind(), part = ?event.part_id(), "event rejected");
        }
        accepted
    }

    // ========================================================================
    // HANDLERS
    // ========================================================================

    pub fn handle_part_enter(&mut self, e: &PartEnter) -> bool {
        let Some(config) = self.layout.station(&e.station_id) else {
            return false;
        };
        let area = non_empty_or(&e.area, &config.area);
        let line = non_empty_or(&e.line, &config.line);

        if let Some(part) = self.parts.get(&e.part_id) {
            if part.is_terminal() {
                return false;
            }
            let duplicate = part
                .history
                .iter()
                .any(|h| h.station_id == e.station_id && h.entered_at_ms == e.timestamp_ms);
            if duplicate {
                return false;
            }
        }

        let part = self
            .parts
            .entry(e.part_id.clone())
            .or_insert_with(|| Part::new(&e.part_id, e.timestamp_ms));
        part.status = PartStatus::InStation;
        part.current_station = Some(e.station_id.clone());
        part.current_area = Some(area.clone());
        part.current_line = Some(line.clone());
        part.stop = None;
        part.history.push(HistoryEntry {
            station_id: e.station_id.clone(),
            area,
            line,
            entered_at_ms: e.timestamp_ms,
            exited_at_ms: None,
            result: None,
            cycle_time_ms: None,
            progress_pct: 0.0,
        });

        if let Some(station) = self.stations.get_mut(&e.station_id) {
            station.status = StationStatus::Running;
            station.current_part_id = Some(e.part_id.clone());
        }
        true
    }

    pub fn handle_part_exit(&mut self, e: &PartExit) -> bool {
        let Some(config) = self.layout.station(&e.station_id) else {
            return false;
        };
        let Some(part) = self.parts.get_mut(&e.part_id) else {
            return false;
        };
        if part.is_terminal() {
            return false;
        }

        let redelivered = part
            .history
            .iter()
            .any(|h| h.station_id == e.station_id && h.exited_at_ms == Some(e.timestamp_ms));
        if redelivered {
            return false;
        }
        if let Some(entry) = part.open_entry_mut(&e.station_id) {
            entry.exited_at_ms = Some(e.timestamp_ms);
            entry.result = Some(e.result);
            entry.cycle_time_ms = Some(e.cycle_time_ms);
            entry.progress_pct = 100.0;
        }

        part.current_station = None;
        part.status = if e.result == ExitResult::Nok {
            PartStatus::Scrapped
        } else if e.result == ExitResult::Rework && config.rework_target.is_some() {
            PartStatus::InTransit
        } else if config.next_stations.is_empty() {
            PartStatus::Completed
        } else {
            PartStatus::InTransit
        };

        if let Some(station) = self.stations.get_mut(&e.station_id) {
            station.counters.record(e.result);
            station.status = StationStatus::Idle;
            station.current_part_id = None;
            station.metrics.cycle_time = Some(e.cycle_time_ms as f64);
            station.metrics.output_count = Some(station.counters.output as f64);
        }
        true
    }

    pub fn handle_part_process(&mut self, e: &PartProcess) -> bool {
        let Some(part) = self.parts.get_mut(&e.part_id) else {
            return false;
        };
        if part.is_terminal() {
            return false;
        }
        match part.open_entry_mut(&e.station_id) {
            Some(entry) => {
                entry.progress_pct = e.progress_pct.clamp(0.0, 100.0);
                true
            }
            None => false,
        }
    }

    pub fn handle_station_status(&mut self, e: &StationStatusUpdate) -> bool {
        let Some(station) = self.stations.get_mut(&e.station_id) else {
            return false;
        };
        station.status = e.status;
        station.current_part_id = if e.status == StationStatus::Running {
            e.current_part_id.clone()
        } else {
            None
        };
        true
    }

    pub fn handle_metric(&mut self, e: &MetricReading) -> bool {
        let capacity = self.config.metric_capacity;
        let Some(station) = self.stations.get_mut(&e.station_id) else {
            return false;
        };
        station
            .history
            .entry(e.metric_id.clone())
            .or_insert_with(|| MetricRing::new(capacity))
            .push(MetricSample {
                value: e.value,
                unit: e.unit.clone(),
                timestamp_ms: e.timestamp_ms,
            });
        match e.metric_id.as_str() {
            "temperature" => station.metrics.temperature = Some(e.value),
            "cycle_time" => station.metrics.cycle_time = Some(e.value),
            "output_count" => station.metrics.output_count = Some(e.value),
            _ => {}
        }
        true
    }

    pub fn handle_transit_start(&mut self, e: &TransitStart) -> bool {
        let Some(part) = self.parts.get_mut(&e.part_id) else {
            return false;
        };
        if part.is_terminal() {
            return false;
        }
        part.status = PartStatus::InTransit;
        part.current_station = None;
        true
    }

    /// Stops a part on a belt. Accepted for a part already scrapped by the
    /// failing sensor so the stop location is recorded either way. A part
    /// scrapped at a station exit has no stop and stays untouched.
    pub fn handle_transit_stop(&mut self, e: &TransitStop) -> bool {
        let Some(part) = self.parts.get_mut(&e.part_id) else {
            return false;
        };
        match part.status {
            PartStatus::Completed => return false,
            PartStatus::Scrapped if part.stop.is_none() => {
                debug!(part = %e.part_id, "stop for a part scrapped at exit");
                return false;
            }
            _ => {}
        }
        let sensor_id = e
            .sensor_id
            .clone()
            .or_else(|| part.stop.as_ref().and_then(|s| s.sensor_id.clone()));
        part.status = PartStatus::Scrapped;
        part.current_station = None;
        part.stop = Some(StopInfo {
            from_station_id: e.from_station_id.clone(),
            to_station_id: e.to_station_id.clone(),
            sensor_id,
            reason: e.reason.clone(),
            stopped_at_ms: e.timestamp_ms,
        });
        true
    }

    pub fn handle_sensor_trigger(&mut self, e: &SensorTrigger) -> bool {
        if !self.sensors.contains_key(&e.sensor_id) {
            return false;
        }
        if let Some(part) = self.parts.get(&e.part_id) {
            if part.is_terminal() {
                return false;
            }
            let duplicate = part
                .sensor_log
                .iter()
                .any(|l| l.sensor_id == e.sensor_id && l.timestamp_ms == e.timestamp_ms);
            if duplicate {
                return false;
            }
        }

        let window = self.config.sensor_active_window_ms;
        if let Some(sensor) = self.sensors.get_mut(&e.sensor_id) {
            sensor.last_triggered_at_ms = Some(e.timestamp_ms);
            sensor.last_decision = Some(e.decision);
            sensor.last_part_id = Some(e.part_id.clone());
            sensor.active_until_ms = Some(e.timestamp_ms.saturating_add(window));
        }

        if let Some(part) = self.parts.get_mut(&e.part_id) {
            part.sensor_log.push(SensorLogEntry {
                sensor_id: e.sensor_id.clone(),
                decision: e.decision,
                timestamp_ms: e.timestamp_ms,
                from_station_id: e.from_station_id.clone(),
                to_station_id: e.to_station_id.clone(),
            });
            if e.decision == SensorDecision::Fail {
                part.status = PartStatus::Scrapped;
                part.current_station = None;
                part.stop = Some(StopInfo {
                    from_station_id: e.from_station_id.clone(),
                    to_station_id: e.to_station_id.clone(),
                    sensor_id: Some(e.sensor_id.clone()),
                    reason: REASON_SENSOR_DATA_CHECK_FAIL.to_string(),
                    stopped_at_ms: e.timestamp_ms,
                });
            }
        }
        true
    }

    /// Returns a scrapped, belt-stopped part to transit.
    pub fn handle_part_override(&mut self, e: &PartOverride) -> Option<&Part> {
        let part = self.parts.get_mut(&e.part_id)?;
        if part.status != PartStatus::Scrapped || part.stop.is_none() {
            return None;
        }
        part.status = PartStatus::InTransit;
        part.stop = None;
        Some(part)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn part(&self, part_id: &str) -> Option<&Part> {
        self.parts.get(part_id)
    }

    /// Owned copy of a part record, for command responses.
    pub fn part_history(&self, part_id: &str) -> Option<Part> {
        self.parts.get(part_id).cloned()
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.values()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn station(&self, station_id: &str) -> Option<&StationState> {
        self.stations.get(station_id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationState> {
        self.stations.values()
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorState> {
        self.sensors.get(sensor_id)
    }

    /// Parts whose id contains `query` (case-insensitive), ordered by id and
    /// capped at the configured limit.
    pub fn search_parts(&self, query: &str) -> Vec<Part> {
        let q = query.to_lowercase();
        let mut hits: Vec<&Part> = self
            .parts
            .values()
            .filter(|p| p.part_id.to_lowercase().contains(&q))
            .collect();
        hits.sort_by(|a, b| a.part_id.cmp(&b.part_id));
        hits.into_iter().take(self.config.search_limit).cloned().collect()
    }

    /// Whether `part_id` is scrapped with a recorded stop location.
    pub fn can_override(&self, part_id: &str) -> bool {
        self.parts
            .get(part_id)
            .is_some_and(|p| p.status == PartStatus::Scrapped && p.stop.is_some())
    }

    /// Number of parts per status.
    pub fn status_counts(&self) -> HashMap<PartStatus, usize> {
        let mut counts = HashMap::new();
        for part in self.parts.values() {
            *counts.entry(part.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        let mut parts: Vec<Part> = self.parts.values().cloned().collect();
        parts.sort_by(|a, b| a.part_id.cmp(&b.part_id));
        let sensors = self
            .sensors
            .iter()
            .map(|(id, state)| {
                (
                    id.clone(),
                    SensorView {
                        state: state.clone(),
                        is_active: state.is_active(now_ms),
                    },
                )
            })
            .collect();
        Snapshot {
            taken_at_ms: now_ms,
            parts,
            stations: self.stations.clone(),
            sensors,
            layout: (*self.layout).clone(),
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{stations, LayoutBuilder};
    use crate::model::{SensorType, StationType};

    const A: &str = "area";
    const L: &str = "line";

    fn layout() -> Arc<FactoryLayout> {
        Arc::new(
            LayoutBuilder::new()
                .line(
                    A,
                    L,
                    "Line",
                    &stations(&[
                        ("load", StationType::Load),
                        ("mach", StationType::Machine),
                        ("meas", StationType::Measure),
                        ("pack", StationType::Pack),
                    ]),
                )
                .rework("meas", "mach")
                .sensor("s-dc", SensorType::DataCheck, "load", "mach", 0.5, 0.03)
                .sensor("s-rt", SensorType::Routing, "mach", "meas", 0.5, 0.06)
                .build(),
        )
    }

    fn tracker() -> StateTracker {
        StateTracker::new(layout(), TrackerConfig::default())
    }

    fn enter(part: &str, station: &str, ts: u64) -> PlantEvent {
        PlantEvent::PartEnter(PartEnter {
            part_id: part.into(),
            station_id: station.into(),
            area: A.into(),
            line: L.into(),
            timestamp_ms: ts,
        })
    }

    fn exit(part: &str, station: &str, result: ExitResult, ts: u64) -> PlantEvent {
        PlantEvent::PartExit(PartExit {
            part_id: part.into(),
            station_id: station.into(),
            area: A.into(),
            line: L.into(),
            result,
            cycle_time_ms: 1000,
            timestamp_ms: ts,
        })
    }

    fn transit(part: &str, from: &str, to: &str, ts: u64) -> PlantEvent {
        PlantEvent::TransitStart(TransitStart {
            part_id: part.into(),
            area: A.into(),
            line: L.into(),
            from_station_id: from.into(),
            to_station_id: to.into(),
            transit_time_ms: 3000,
            timestamp_ms: ts,
        })
    }

    fn trigger(sensor: &str, part: &str, decision: SensorDecision, ts: u64) -> PlantEvent {
        PlantEvent::SensorTrigger(SensorTrigger {
            sensor_id: sensor.into(),
            part_id: part.into(),
            area: A.into(),
            line: L.into(),
            sensor_type: SensorType::DataCheck,
            decision,
            from_station_id: "load".into(),
            to_station_id: "mach".into(),
            timestamp_ms: ts,
        })
    }

    fn stop(part: &str, ts: u64) -> PlantEvent {
        PlantEvent::TransitStop(TransitStop {
            part_id: part.into(),
            area: A.into(),
            line: L.into(),
            from_station_id: "load".into(),
            to_station_id: "mach".into(),
            reason: REASON_SENSOR_DATA_CHECK_FAIL.into(),
            sensor_id: None,
            timestamp_ms: ts,
        })
    }

    fn override_event(part: &str, ts: u64) -> PartOverride {
        PartOverride {
            part_id: part.into(),
            area: A.into(),
            line: L.into(),
            timestamp_ms: ts,
        }
    }

    #[test]
    fn test_enter_creates_part_and_runs_station() {
        let mut t = tracker();
        assert!(t.apply(&enter("P1", "load", 10)));

        let part = t.part("P1").unwrap();
        assert_eq!(part.status, PartStatus::InStation);
        assert_eq!(part.created_at_ms, 10);
        assert_eq!(part.current_station.as_deref(), Some("load"));
        assert_eq!(part.open_entries(), 1);

        let station = t.station("load").unwrap();
        assert_eq!(station.status, StationStatus::Running);
        assert_eq!(station.current_part_id.as_deref(), Some("P1"));
    }

    #[test]
    fn test_enter_rejects_unknown_station_and_duplicate() {
        let mut t = tracker();
        assert!(!t.apply(&enter("P1", "nowhere", 10)));
        assert!(t.part("P1").is_none());

        assert!(t.apply(&enter("P1", "load", 10)));
        assert!(!t.apply(&enter("P1", "load", 10)));
        assert_eq!(t.part("P1").unwrap().history.len(), 1);
        assert_eq!(t.stats(), TrackerStats { accepted: 1, rejected: 2 });
    }

    #[test]
    fn test_exit_routes_by_verdict_and_downstream() {
        let mut t = tracker();
        t.apply(&enter("P1", "load", 1));
        assert!(t.apply(&exit("P1", "load", ExitResult::Ok, 2)));
        assert_eq!(t.part("P1").unwrap().status, PartStatus::InTransit);

        t.apply(&enter("P2", "pack", 1));
        t.apply(&exit("P2", "pack", ExitResult::Ok, 2));
        assert_eq!(t.part("P2").unwrap().status, PartStatus::Completed);

        t.apply(&enter("P3", "meas", 1));
        t.apply(&exit("P3", "meas", ExitResult::Nok, 2));
        assert_eq!(t.part("P3").unwrap().status, PartStatus::Scrapped);

        t.apply(&enter("P4", "meas", 3));
        t.apply(&exit("P4", "meas", ExitResult::Rework, 4));
        assert_eq!(t.part("P4").unwrap().status, PartStatus::InTransit);

        let meas = t.station("meas").unwrap();
        assert_eq!(meas.counters.output, 2);
        assert_eq!(meas.counters.nok, 1);
        assert_eq!(meas.counters.rework, 1);
        assert_eq!(meas.status, StationStatus::Idle);
        assert!(meas.current_part_id.is_none());
        assert_eq!(meas.metrics.cycle_time, Some(1000.0));
    }

    #[test]
    fn test_exit_closes_entry() {
        let mut t = tracker();
        t.apply(&enter("P1", "mach", 1));
        t.apply(&exit("P1", "mach", ExitResult::Ok, 9));
        let entry = &t.part("P1").unwrap().history[0];
        assert_eq!(entry.exited_at_ms, Some(9));
        assert_eq!(entry.result, Some(ExitResult::Ok));
        assert_eq!(entry.progress_pct, 100.0);
    }

    #[test]
    fn test_redelivered_exit_is_rejected() {
        let mut t = tracker();
        t.apply(&enter("P1", "load", 1));
        assert!(t.apply(&exit("P1", "load", ExitResult::Ok, 2)));
        assert!(!t.apply(&exit("P1", "load", ExitResult::Ok, 2)));
        assert_eq!(t.station("load").unwrap().counters.output, 1);

        // A late copy of the enter does not reopen the visit.
        assert!(!t.apply(&enter("P1", "load", 1)));
        assert_eq!(t.part("P1").unwrap().open_entries(), 0);
    }

    #[test]
    fn test_terminal_part_rejects_everything() {
        let mut t = tracker();
        t.apply(&enter("P1", "pack", 1));
        t.apply(&exit("P1", "pack", ExitResult::Ok, 2));
        let before = t.part("P1").cloned();

        assert!(!t.apply(&enter("P1", "load", 3)));
        assert!(!t.apply(&exit("P1", "pack", ExitResult::Ok, 4)));
        assert!(!t.apply(&transit("P1", "load", "mach", 5)));
        assert!(!t.apply(&stop("P1", 6)));
        assert!(!t.apply(&trigger("s-dc", "P1", SensorDecision::Pass, 7)));
        assert!(t.handle_part_override(&override_event("P1", 8)).is_none());
        assert_eq!(t.part("P1").cloned(), before);
    }

    #[test]
    fn test_progress_updates_open_entry_only() {
        let mut t = tracker();
        let process = |ts, pct| {
            PlantEvent::PartProcess(PartProcess {
                part_id: "P1".into(),
                station_id: "mach".into(),
                area: A.into(),
                line: L.into(),
                progress_pct: pct,
                timestamp_ms: ts,
            })
        };
        assert!(!t.apply(&process(1, 10.0)));
        t.apply(&enter("P1", "mach", 1));
        assert!(t.apply(&process(2, 37.5)));
        assert_eq!(t.part("P1").unwrap().history[0].progress_pct, 37.5);
        t.apply(&exit("P1", "mach", ExitResult::Ok, 3));
        assert!(!t.apply(&process(4, 50.0)));
    }

    #[test]
    fn test_station_status_clears_part_unless_running() {
        let mut t = tracker();
        let status = |status, part: Option<&str>| {
            PlantEvent::StationStatus(StationStatusUpdate {
                station_id: "mach".into(),
                area: A.into(),
                line: L.into(),
                status,
                current_part_id: part.map(str::to_string),
                timestamp_ms: 1,
            })
        };
        assert!(t.apply(&status(StationStatus::Running, Some("P1"))));
        assert_eq!(t.station("mach").unwrap().current_part_id.as_deref(), Some("P1"));
        assert!(t.apply(&status(StationStatus::Error, Some("P1"))));
        assert!(t.station("mach").unwrap().current_part_id.is_none());

        let unknown = PlantEvent::StationStatus(StationStatusUpdate {
            station_id: "ghost".into(),
            area: A.into(),
            line: L.into(),
            status: StationStatus::Idle,
            current_part_id: None,
            timestamp_ms: 1,
        });
        assert!(!t.apply(&unknown));
    }

    #[test]
    fn test_metric_ring_and_latest() {
        let mut t = StateTracker::new(
            layout(),
            TrackerConfig {
                metric_capacity: 3,
                ..TrackerConfig::default()
            },
        );
        for i in 0..5 {
            let metric = PlantEvent::Metric(MetricReading {
                station_id: "mach".into(),
                area: A.into(),
                line: L.into(),
                metric_id: "temperature".into(),
                value: 60.0 + i as f64,
                unit: "celsius".into(),
                timestamp_ms: i,
            });
            assert!(t.apply(&metric));
        }
        let station = t.station("mach").unwrap();
        assert_eq!(station.history["temperature"].values(), vec![62.0, 63.0, 64.0]);
        assert_eq!(station.metrics.temperature, Some(64.0));
    }

    #[test]
    fn test_sensor_fail_scraps_with_stop_info() {
        let mut t = tracker();
        t.apply(&enter("P1", "load", 1));
        t.apply(&exit("P1", "load", ExitResult::Ok, 2));
        t.apply(&transit("P1", "load", "mach", 3));
        assert!(t.apply(&trigger("s-dc", "P1", SensorDecision::Fail, 4)));

        let part = t.part("P1").unwrap();
        assert_eq!(part.status, PartStatus::Scrapped);
        let info = part.stop.as_ref().unwrap();
        assert_eq!(info.sensor_id.as_deref(), Some("s-dc"));
        assert_eq!(info.from_station_id, "load");
        assert!(t.can_override("P1"));

        // The follow-up stop keeps the sensor that failed.
        assert!(t.apply(&stop("P1", 5)));
        let info = t.part("P1").unwrap().stop.clone().unwrap();
        assert_eq!(info.sensor_id.as_deref(), Some("s-dc"));
        assert_eq!(info.stopped_at_ms, 5);
    }

    #[test]
    fn test_sensor_trigger_rules() {
        let mut t = tracker();
        assert!(!t.apply(&trigger("ghost", "P1", SensorDecision::Pass, 1)));

        // Unknown part still updates the sensor.
        assert!(t.apply(&trigger("s-dc", "P9", SensorDecision::Pass, 100)));
        let sensor = t.sensor("s-dc").unwrap();
        assert_eq!(sensor.last_part_id.as_deref(), Some("P9"));
        assert!(sensor.is_active(2099));
        assert!(!sensor.is_active(2100));

        t.apply(&enter("P1", "load", 1));
        assert!(t.apply(&trigger("s-dc", "P1", SensorDecision::Pass, 200)));
        assert!(!t.apply(&trigger("s-dc", "P1", SensorDecision::Pass, 200)));
        assert_eq!(t.part("P1").unwrap().sensor_log.len(), 1);
    }

    #[test]
    fn test_transit_stop_rules() {
        let mut t = tracker();
        assert!(!t.apply(&stop("P1", 1)));
        t.apply(&enter("P1", "load", 1));
        assert!(t.apply(&stop("P1", 2)));
        assert_eq!(t.part("P1").unwrap().status, PartStatus::Scrapped);
    }

    #[test]
    fn test_override_returns_part_to_transit() {
        let mut t = tracker();
        t.apply(&enter("P1", "load", 1));
        t.apply(&exit("P1", "load", ExitResult::Ok, 2));
        t.apply(&trigger("s-dc", "P1", SensorDecision::Fail, 3));

        let part = t.handle_part_override(&override_event("P1", 4)).unwrap();
        assert_eq!(part.status, PartStatus::InTransit);
        assert!(part.stop.is_none());
        assert!(!t.can_override("P1"));

        // Resumed journey is accepted again.
        assert!(t.apply(&enter("P1", "mach", 5)));
    }

    #[test]
    fn test_override_requires_stop_info() {
        let mut t = tracker();
        t.apply(&enter("P1", "meas", 1));
        t.apply(&exit("P1", "meas", ExitResult::Nok, 2));
        assert!(!t.can_override("P1"));
        assert!(t.handle_part_override(&override_event("P1", 3)).is_none());
        assert!(t.handle_part_override(&override_event("nobody", 3)).is_none());
    }

    #[test]
    fn test_stop_after_exit_scrap_is_rejected() {
        let mut t = tracker();
        t.apply(&enter("P1", "meas", 1));
        t.apply(&exit("P1", "meas", ExitResult::Nok, 2));
        let before = t.part("P1").cloned();

        assert!(!t.apply(&stop("P1", 3)));
        assert_eq!(t.part("P1").cloned(), before);
        assert!(!t.can_override("P1"));
        assert!(t.handle_part_override(&override_event("P1", 4)).is_none());

        // A part stopped by its sensor still takes the belt stop
        t.apply(&enter("P2", "load", 5));
        t.apply(&exit("P2", "load", ExitResult::Ok, 6));
        t.apply(&trigger("s-dc", "P2", SensorDecision::Fail, 7));
        assert!(t.apply(&stop("P2", 8)));
        assert!(t.can_override("P2"));
    }

    #[test]
    fn test_search_is_case_insensitive_and_capped() {
        let mut t = tracker();
        for i in 0..30 {
            t.apply(&enter(&format!("PART-{:05}", i), "load", i));
        }
        assert_eq!(t.search_parts("part").len(), 20);
        let hits = t.search_parts("00007");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].part_id, "PART-00007");
        assert!(t.search_parts("zzz").is_empty());
    }

    #[test]
    fn test_snapshot_reports_sensor_activity() {
        let mut t = tracker();
        t.apply(&trigger("s-dc", "P1", SensorDecision::Pass, 1000));
        let snap = t.snapshot(1500);
        assert!(snap.sensors["s-dc"].is_active);
        assert!(!snap.sensors["s-rt"].is_active);
        assert_eq!(snap.stations.len(), 4);
        assert_eq!(snap.layout.stations.len(), 4);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["sensors"]["s-dc"]["isActive"], true);
        assert_eq!(json["sensors"]["s-dc"]["lastPartId"], "P1");
    }
}
