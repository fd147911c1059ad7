//! Wire codec: `PlantEvent` <-> topic + JSON payload.
//!
//! Topic layout (all under `factory/{area}/{line}`):
//!
//! ```text
//! {stationId}/part/enter        PartEnter
//! {stationId}/part/exit         PartExit
//! {stationId}/part/process      PartProcess
//! {stationId}/status            StationStatus
//! {stationId}/metrics/{metric}  Metric
//! transit/start                 TransitStart
//! transit/stop                  TransitStop
//! sensor/{sensorId}/trigger     SensorTrigger
//! override                      PartOverride
//! ```
//!
//! Ids carried by the topic (area, line, station, sensor, metric) take
//! precedence over the same fields in the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use flowtwin_env::{EnvError, Envelope};

use crate::event::PlantEvent;

const ROOT: &str = "factory";

/// Topic an event is published on.
pub fn topic_for(event: &PlantEvent) -> String {
    let (area, line) = event.area_line();
    let base = format!("{}/{}/{}", ROOT, area, line);
    match event {
        PlantEvent::PartEnter(e) => format!("{}/{}/part/enter", base, e.station_id),
        PlantEvent::PartExit(e) => format!("{}/{}/part/exit", base, e.station_id),
        PlantEvent::PartProcess(e) => format!("{}/{}/part/process", base, e.station_id),
        PlantEvent::StationStatus(e) => format!("{}/{}/status", base, e.station_id),
        PlantEvent::Metric(e) => format!("{}/{}/metrics/{}", base, e.station_id, e.metric_id),
        PlantEvent::TransitStart(_) => format!("{}/transit/start", base),
        PlantEvent::TransitStop(_) => format!("{}/transit/stop", base),
        PlantEvent::SensorTrigger(e) => format!("{}/sensor/{}/trigger", base, e.sensor_id),
        PlantEvent::PartOverride(_) => format!("{}/override", base),
    }
}

/// Encodes an event into an envelope stamped with the event's timestamp.
pub fn encode(event: &PlantEvent) -> Result<Envelope, EnvError> {
    let payload = match event {
        PlantEvent::PartEnter(e) => to_payload(e),
        PlantEvent::PartExit(e) => to_payload(e),
        PlantEvent::PartProcess(e) => to_payload(e),
        PlantEvent::StationStatus(e) => to_payload(e),
        PlantEvent::Metric(e) => to_payload(e),
        PlantEvent::TransitStart(e) => to_payload(e),
        PlantEvent::TransitStop(e) => to_payload(e),
        PlantEvent::SensorTrigger(e) => to_payload(e),
        PlantEvent::PartOverride(e) => to_payload(e),
    }?;
    Ok(Envelope::new(topic_for(event), payload, event.timestamp_ms()))
}

fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, EnvError> {
    serde_json::to_vec(value).map_err(EnvError::codec)
}

/// Decodes an envelope. Unknown topics and malformed payloads yield `None`.
pub fn decode(envelope: &Envelope) -> Option<PlantEvent> {
    let segments = envelope.segments();
    if segments.len() < 4 || segments[0] != ROOT {
        return None;
    }
    let area = segments[1];
    let line = segments[2];
    let rest = &segments[3..];

    let mut data = match serde_json::from_slice::<Value>(&envelope.payload).ok()? {
        Value::Object(map) => map,
        _ => return None,
    };
    set(&mut data, "area", area);
    set(&mut data, "line", line);

    match rest {
        ["transit", "start"] => parse(data).map(PlantEvent::TransitStart),
        ["transit", "stop"] => parse(data).map(PlantEvent::TransitStop),
        ["override"] => parse(data).map(PlantEvent::PartOverride),
        ["sensor", sensor_id, "trigger"] => {
            set(&mut data, "sensorId", sensor_id);
            parse(data).map(PlantEvent::SensorTrigger)
        }
        [station_id, tail @ ..] => {
            set(&mut data, "stationId", station_id);
            match tail {
                ["part", "enter"] => parse(data).map(PlantEvent::PartEnter),
                ["part", "exit"] => parse(data).map(PlantEvent::PartExit),
                ["part", "process"] => parse(data).map(PlantEvent::PartProcess),
                ["status"] => parse(data).map(PlantEvent::StationStatus),
                ["metrics", metric_id] => {
                    set(&mut data, "metricId", metric_id);
                    parse(data).map(PlantEvent::Metric)
                }
                _ => None,
            }
        }
        [] => None,
    }
}

fn set(data: &mut Map<String, Value>, key: &str, value: &str) {
    data.insert(key.to_string(), Value::String(value.to_string()));
}

fn parse<T: DeserializeOwned>(data: Map<String, Value>) -> Option<T> {
    serde_json::from_value(Value::Object(data)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::*;
    use crate::model::{ExitResult, SensorDecision, SensorType, StationStatus};

    fn envelope(topic: &str, json: &str) -> Envelope {
        Envelope::new(topic, json.as_bytes().to_vec(), 0)
    }

    #[test]
    fn test_topics() {
        let enter = PlantEvent::PartEnter(PartEnter {
            part_id: "PART-00001".into(),
            station_id: "aa-load-1-01".into(),
            area: "assembly-a".into(),
            line: "line-aa1".into(),
            timestamp_ms: 5,
        });
        assert_eq!(topic_for(&enter), "factory/assembly-a/line-aa1/aa-load-1-01/part/enter");

        let metric = PlantEvent::Metric(MetricReading {
            station_id: "st".into(),
            area: "a".into(),
            line: "l".into(),
            metric_id: "temperature".into(),
            value: 60.2,
            unit: "celsius".into(),
            timestamp_ms: 5,
        });
        assert_eq!(topic_for(&metric), "factory/a/l/st/metrics/temperature");

        let ov = PlantEvent::PartOverride(PartOverride {
            part_id: "p".into(),
            area: "a".into(),
            line: "l".into(),
            timestamp_ms: 1,
        });
        assert_eq!(topic_for(&ov), "factory/a/l/override");
    }

    #[test]
    fn test_encode_then_decode_sensor_trigger() {
        let event = PlantEvent::SensorTrigger(SensorTrigger {
            sensor_id: "snsr-aa-1-01".into(),
            part_id: "PART-00003".into(),
            area: "assembly-a".into(),
            line: "line-aa1".into(),
            sensor_type: SensorType::DataCheck,
            decision: SensorDecision::Fail,
            from_station_id: "a".into(),
            to_station_id: "b".into(),
            timestamp_ms: 1234,
        });
        let env = encode(&event).unwrap();
        assert_eq!(env.timestamp_ms, 1234);
        assert_eq!(decode(&env), Some(event));
    }

    #[test]
    fn test_decode_takes_ids_from_topic() {
        let env = envelope(
            "factory/welding-a/line-wa1/wa-machine-1-02/part/process",
            r#"{"partId":"PART-00009","progressPct":42.5,"timestamp":77}"#,
        );
        match decode(&env) {
            Some(PlantEvent::PartProcess(p)) => {
                assert_eq!(p.station_id, "wa-machine-1-02");
                assert_eq!(p.area, "welding-a");
                assert_eq!(p.line, "line-wa1");
                assert_eq!(p.progress_pct, 42.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_status_and_exit() {
        let status = envelope(
            "factory/a/l/st/status",
            r#"{"stationId":"other","status":"running","currentPartId":"P","timestamp":1}"#,
        );
        match decode(&status) {
            Some(PlantEvent::StationStatus(s)) => {
                assert_eq!(s.station_id, "st");
                assert_eq!(s.status, StationStatus::Running);
                assert_eq!(s.current_part_id.as_deref(), Some("P"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let exit = envelope(
            "factory/a/l/st/part/exit",
            r#"{"partId":"P","result":"rework","cycleTimeMs":9000,"timestamp":2}"#,
        );
        match decode(&exit) {
            Some(PlantEvent::PartExit(e)) => assert_eq!(e.result, ExitResult::Rework),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_metric_without_unit() {
        let env = envelope("factory/a/l/st/metrics/vibration", r#"{"value":2.4,"timestamp":3}"#);
        match decode(&env) {
            Some(PlantEvent::Metric(m)) => {
                assert_eq!(m.metric_id, "vibration");
                assert_eq!(m.unit, "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_input_is_dropped() {
        assert!(decode(&envelope("factory/a/l/st/part/enter", "not json")).is_none());
        assert!(decode(&envelope("factory/a/l/st/part/enter", "[1,2]")).is_none());
        assert!(decode(&envelope("factory/a/l/st/part/enter", r#"{"timestamp":1}"#)).is_none());
        assert!(decode(&envelope("plant/a/l/st/status", r#"{"status":"idle","timestamp":1}"#)).is_none());
        assert!(decode(&envelope("factory/a/l", "{}")).is_none());
        assert!(decode(&envelope("factory/a/l/st/unknown", r#"{"timestamp":1}"#)).is_none());
        assert!(decode(&envelope(
            "factory/a/l/st/part/exit",
            r#"{"partId":"P","result":"maybe","cycleTimeMs":1,"timestamp":1}"#
        ))
        .is_none());
    }
}
