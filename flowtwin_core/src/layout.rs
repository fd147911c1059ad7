//! Factory topology: stations, lines, areas and belt sensors.
//!
//! The station graph is an adjacency map keyed by station id. Rework edges
//! point back to earlier stations, so the graph is cyclic; cycles are plain
//! data here, never object references.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::LayoutError;
use crate::model::{
    AreaConfig, LineConfig, Position, SensorConfig, SensorType, StationConfig, StationType,
};

/// A part's itinerary: the ordered stations of one production line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub line_id: String,
    pub area: String,
    pub stations: Vec<String>,
}

impl Route {
    pub fn entry(&self) -> Option<&str> {
        self.stations.first().map(String::as_str)
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.iter().any(|s| s == station_id)
    }
}

/// Complete static topology of the plant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryLayout {
    pub areas: Vec<AreaConfig>,
    pub stations: HashMap<String, StationConfig>,
    pub sensors: Vec<SensorConfig>,
}

impl FactoryLayout {
    /// Parses and validates a layout from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, LayoutError> {
        let layout: FactoryLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Reads, parses and validates a layout file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn station(&self, station_id: &str) -> Option<&StationConfig> {
        self.stations.get(station_id)
    }

    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.sensor_id == sensor_id)
    }

    /// Sensors on the belt `from -> to`, ordered by position along the belt.
    pub fn sensors_on(&self, from: &str, to: &str) -> Vec<&SensorConfig> {
        let mut sensors: Vec<&SensorConfig> = self
            .sensors
            .iter()
            .filter(|s| s.from_station_id == from && s.to_station_id == to)
            .collect();
        sensors.sort_by(|a, b| a.position_on_belt.total_cmp(&b.position_on_belt));
        sensors
    }

    /// All production lines, in declaration order.
    pub fn lines(&self) -> impl Iterator<Item = &LineConfig> {
        self.areas.iter().flat_map(|a| a.lines.iter())
    }

    pub fn line(&self, line_id: &str) -> Option<&LineConfig> {
        self.lines().find(|l| l.line_id == line_id)
    }

    /// Routes for every production line.
    pub fn routes(&self) -> Vec<Route> {
        self.lines().map(route_of).collect()
    }

    /// Route of the line a station belongs to.
    pub fn route_for_station(&self, station_id: &str) -> Option<Route> {
        let station = self.station(station_id)?;
        self.line(&station.line).map(route_of)
    }

    /// Checks every cross-reference and numeric range.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let mut lines = 0;
        for line in self.lines() {
            lines += 1;
            if line.stations.is_empty() {
                return Err(LayoutError::EmptyLine(line.line_id.clone()));
            }
            for id in &line.stations {
                self.require_station(&line.line_id, id)?;
            }
        }
        if lines == 0 {
            return Err(LayoutError::NoLines);
        }

        for (key, station) in &self.stations {
            if key != &station.station_id {
                return Err(LayoutError::KeyMismatch {
                    key: key.clone(),
                    station_id: station.station_id.clone(),
                });
            }
            if station.processing_time_ms.0 > station.processing_time_ms.1 {
                return Err(LayoutError::InvertedRange(station.station_id.clone()));
            }
            for next in &station.next_stations {
                self.require_station(&station.station_id, next)?;
            }
            if let Some(target) = &station.rework_target {
                self.require_station(&station.station_id, target)?;
            }
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.sensor_id.as_str()) {
                return Err(LayoutError::DuplicateId(sensor.sensor_id.clone()));
            }
            self.require_station(&sensor.sensor_id, &sensor.from_station_id)?;
            self.require_station(&sensor.sensor_id, &sensor.to_station_id)?;
            for (field, value) in [
                ("position", sensor.position_on_belt),
                ("fail probability", sensor.fail_probability),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(LayoutError::OutOfRange {
                        sensor_id: sensor.sensor_id.clone(),
                        field,
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    fn require_station(&self, from: &str, id: &str) -> Result<(), LayoutError> {
        if self.stations.contains_key(id) {
            Ok(())
        } else {
            Err(LayoutError::UnknownStation {
                from: from.to_string(),
                missing: id.to_string(),
            })
        }
    }

    /// The standard plant: 10 areas, 2 lines each, 10 stations per line and
    /// one sensor per belt segment (200 stations, 180 sensors).
    pub fn standard() -> Self {
        let mut builder = LayoutBuilder::new();
        let mut display_id = 1001u32;

        for area in AREA_DEFS {
            for (line_idx, line_id) in area.line_ids.iter().enumerate() {
                let line_num = line_idx + 1;
                let mut ids = Vec::with_capacity(LINE_PATTERN.len());

                for (s_idx, station_type) in LINE_PATTERN.iter().enumerate() {
                    let id = format!("{}-{}-{}-{:02}", area.prefix, station_type.slug(), line_num, s_idx + 1);
                    ids.push((id, *station_type));
                }

                builder = builder.line(area.area_id, line_id, &area.name_for(line_num), &ids);
                if let Some(area_cfg) = builder.layout.areas.iter_mut().find(|a| a.area_id == area.area_id) {
                    area_cfg.name = area.name.to_string();
                }

                for (s_idx, (id, station_type)) in ids.iter().enumerate() {
                    let station = builder.station_mut(id);
                    station.display_id = display_id.to_string();
                    station.name = format!(
                        "{} {}-{}-{:02}",
                        station_type.display_name(),
                        area.prefix.to_uppercase(),
                        line_num,
                        s_idx + 1
                    );
                    station.position = Position {
                        x: station_x(area.col, s_idx),
                        y: ROW_Y_STARTS[area.row] + LINE_Y_OFFSETS[line_idx],
                    };
                    display_id += 1;
                }

                // Measure stations rework to the nearest upstream machine.
                for (s_idx, (id, station_type)) in ids.iter().enumerate() {
                    if *station_type != StationType::Measure {
                        continue;
                    }
                    if let Some((target, _)) = ids[..s_idx]
                        .iter()
                        .rev()
                        .find(|(_, t)| *t == StationType::Machine)
                    {
                        builder = builder.rework(id, target);
                    }
                }

                for s_idx in 0..ids.len() - 1 {
                    let sensor_type = SENSOR_TYPE_CYCLE[s_idx % SENSOR_TYPE_CYCLE.len()];
                    let from = &ids[s_idx].0;
                    let sensor_id = format!("snsr-{}-{}-{:02}", area.prefix, line_num, s_idx + 1);
                    let display = format!("S-{}-A", builder.station_mut(from).display_id);
                    builder = builder.sensor(
                        &sensor_id,
                        sensor_type,
                        from,
                        &ids[s_idx + 1].0,
                        0.5,
                        standard_fail_probability(sensor_type),
                    );
                    if let Some(sensor) = builder.layout.sensors.last_mut() {
                        sensor.display_id = display;
                    }
                }
            }
        }

        builder.build()
    }
}

fn route_of(line: &LineConfig) -> Route {
    Route {
        line_id: line.line_id.clone(),
        area: line.area.clone(),
        stations: line.stations.clone(),
    }
}

// ============================================================================
// STANDARD LAYOUT TABLES
// ============================================================================

struct AreaDef {
    prefix: &'static str,
    name: &'static str,
    area_id: &'static str,
    col: usize,
    row: usize,
    line_ids: [&'static str; 2],
}

impl AreaDef {
    fn name_for(&self, line_num: usize) -> String {
        format!("{} Line {}", self.name, line_num)
    }
}

const AREA_DEFS: &[AreaDef] = &[
    AreaDef { prefix: "aa", name: "Assembly A", area_id: "assembly-a", col: 0, row: 0, line_ids: ["line-aa1", "line-aa2"] },
    AreaDef { prefix: "ab", name: "Assembly B", area_id: "assembly-b", col: 1, row: 0, line_ids: ["line-ab1", "line-ab2"] },
    AreaDef { prefix: "wa", name: "Welding A", area_id: "welding-a", col: 0, row: 1, line_ids: ["line-wa1", "line-wa2"] },
    AreaDef { prefix: "wb", name: "Welding B", area_id: "welding-b", col: 1, row: 1, line_ids: ["line-wb1", "line-wb2"] },
    AreaDef { prefix: "ma", name: "Machining A", area_id: "machining-a", col: 0, row: 2, line_ids: ["line-ma1", "line-ma2"] },
    AreaDef { prefix: "mb", name: "Machining B", area_id: "machining-b", col: 1, row: 2, line_ids: ["line-mb1", "line-mb2"] },
    AreaDef { prefix: "pa", name: "Painting A", area_id: "painting-a", col: 0, row: 3, line_ids: ["line-pa1", "line-pa2"] },
    AreaDef { prefix: "pb", name: "Painting B", area_id: "painting-b", col: 1, row: 3, line_ids: ["line-pb1", "line-pb2"] },
    AreaDef { prefix: "ka", name: "Packaging A", area_id: "packaging-a", col: 0, row: 4, line_ids: ["line-ka1", "line-ka2"] },
    AreaDef { prefix: "kb", name: "Packaging B", area_id: "packaging-b", col: 1, row: 4, line_ids: ["line-kb1", "line-kb2"] },
];

const LINE_PATTERN: [StationType; 10] = [
    StationType::Load,
    StationType::Machine,
    StationType::Machine,
    StationType::Buffer,
    StationType::Measure,
    StationType::Machine,
    StationType::Machine,
    StationType::Measure,
    StationType::Inspection,
    StationType::Pack,
];

const SENSOR_TYPE_CYCLE: [SensorType; 3] = [
    SensorType::DataCheck,
    SensorType::Routing,
    SensorType::ProcessDecision,
];

const COL_X_START: [f64; 2] = [60.0, 860.0];
const COL_X_END: [f64; 2] = [740.0, 1540.0];
const ROW_Y_STARTS: [f64; 5] = [10.0, 185.0, 360.0, 535.0, 710.0];
const LINE_Y_OFFSETS: [f64; 2] = [50.0, 120.0];

fn station_x(col: usize, index: usize) -> f64 {
    (COL_X_START[col] + index as f64 * ((COL_X_END[col] - COL_X_START[col]) / 9.0)).round()
}

/// Default failure probability per sensor type.
pub fn standard_fail_probability(sensor_type: SensorType) -> f64 {
    match sensor_type {
        SensorType::DataCheck => 0.03,
        SensorType::Routing => 0.06,
        SensorType::ProcessDecision => 0.10,
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Incremental layout construction, used by the standard layout, scenario
/// setups and tests.
///
/// `line()` chains the given stations in order (each one's `next_stations`
/// is the following station) and gives them their type's default
/// processing range.
#[derive(Debug, Default)]
pub struct LayoutBuilder {
    layout: FactoryLayout,
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a production line of chained stations.
    pub fn line(mut self, area: &str, line_id: &str, name: &str, stations: &[(String, StationType)]) -> Self {
        for (idx, (id, station_type)) in stations.iter().enumerate() {
            let next_stations = stations
                .get(idx + 1)
                .map(|(next, _)| vec![next.clone()])
                .unwrap_or_default();
            self.layout.stations.insert(
                id.clone(),
                StationConfig {
                    station_id: id.clone(),
                    display_id: id.clone(),
                    name: id.clone(),
                    area: area.to_string(),
                    line: line_id.to_string(),
                    station_type: *station_type,
                    position: Position::default(),
                    next_stations,
                    rework_target: None,
                    processing_time_ms: station_type.processing_time_ms(),
                },
            );
        }

        let line = LineConfig {
            line_id: line_id.to_string(),
            area: area.to_string(),
            name: name.to_string(),
            stations: stations.iter().map(|(id, _)| id.clone()).collect(),
        };
        match self.layout.areas.iter_mut().find(|a| a.area_id == area) {
            Some(existing) => existing.lines.push(line),
            None => self.layout.areas.push(AreaConfig {
                area_id: area.to_string(),
                name: area.to_string(),
                lines: vec![line],
            }),
        }
        self
    }

    /// Sets the rework target of a station.
    pub fn rework(mut self, station_id: &str, target: &str) -> Self {
        self.station_mut(station_id).rework_target = Some(target.to_string());
        self
    }

    /// Overrides the processing-time range of a station.
    pub fn processing(mut self, station_id: &str, min_ms: u64, max_ms: u64) -> Self {
        self.station_mut(station_id).processing_time_ms = (min_ms, max_ms);
        self
    }

    /// Replaces the downstream stations of a station.
    pub fn next(mut self, station_id: &str, next: &[&str]) -> Self {
        self.station_mut(station_id).next_stations = next.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Adds a sensor on the belt `from -> to`.
    pub fn sensor(
        mut self,
        sensor_id: &str,
        sensor_type: SensorType,
        from: &str,
        to: &str,
        position_on_belt: f64,
        fail_probability: f64,
    ) -> Self {
        self.layout.sensors.push(SensorConfig {
            sensor_id: sensor_id.to_string(),
            display_id: sensor_id.to_string(),
            sensor_type,
            from_station_id: from.to_string(),
            to_station_id: to.to_string(),
            position_on_belt,
            fail_probability,
        });
        self
    }

    /// Scales every sensor's failure probability (clamped to 1.0).
    pub fn scale_sensor_failures(mut self, factor: f64) -> Self {
        for sensor in &mut self.layout.sensors {
            sensor.fail_probability = (sensor.fail_probability * factor).clamp(0.0, 1.0);
        }
        self
    }

    fn station_mut(&mut self, station_id: &str) -> &mut StationConfig {
        self.layout
            .stations
            .entry(station_id.to_string())
            .or_insert_with(|| StationConfig {
                station_id: station_id.to_string(),
                display_id: station_id.to_string(),
                name: station_id.to_string(),
                area: String::new(),
                line: String::new(),
                station_type: StationType::Buffer,
                position: Position::default(),
                next_stations: Vec::new(),
                rework_target: None,
                processing_time_ms: StationType::Buffer.processing_time_ms(),
            })
    }

    pub fn build(self) -> FactoryLayout {
        self.layout
    }
}

impl FactoryLayout {
    /// Starts a builder from an existing layout.
    pub fn into_builder(self) -> LayoutBuilder {
        LayoutBuilder { layout: self }
    }
}

/// Shorthand for building `(id, type)` station lists.
pub fn stations(list: &[(&str, StationType)]) -> Vec<(String, StationType)> {
    list.iter().map(|(id, t)| (id.to_string(), *t)).collect()
}
