//! Sensor Evaluator: one random draw per sensor pass.

use rand::Rng;

use crate::model::{SensorConfig, SensorDecision, SensorType};

/// Maps a uniform sample to a decision.
///
/// A sample strictly below `fail_probability` produces the sensor type's
/// negative outcome, anything else passes.
pub fn decide(sensor_type: SensorType, sample: f64, fail_probability: f64) -> SensorDecision {
    if sample >= fail_probability {
        return SensorDecision::Pass;
    }
    match sensor_type {
        SensorType::DataCheck => SensorDecision::Fail,
        SensorType::Routing => SensorDecision::Rework,
        SensorType::ProcessDecision => SensorDecision::SkipProcess,
    }
}

/// Evaluates `sensor` with one uniform `[0, 1)` sample from `rng`.
pub fn evaluate<R: Rng + ?Sized>(sensor: &SensorConfig, rng: &mut R) -> SensorDecision {
    let sample: f64 = rng.gen();
    decide(sensor.sensor_type, sample, sensor.fail_probability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn sensor(sensor_type: SensorType, p: f64) -> SensorConfig {
        SensorConfig {
            sensor_id: "snsr".into(),
            display_id: "S-1".into(),
            sensor_type,
            from_station_id: "a".into(),
            to_station_id: "b".into(),
            position_on_belt: 0.5,
            fail_probability: p,
        }
    }

    #[test]
    fn test_decide_negative_outcomes() {
        assert_eq!(decide(SensorType::DataCheck, 0.01, 0.03), SensorDecision::Fail);
        assert_eq!(decide(SensorType::Routing, 0.01, 0.06), SensorDecision::Rework);
        assert_eq!(decide(SensorType::ProcessDecision, 0.01, 0.10), SensorDecision::SkipProcess);
    }

    #[test]
    fn test_decide_boundary_passes() {
        assert_eq!(decide(SensorType::DataCheck, 0.03, 0.03), SensorDecision::Pass);
        assert_eq!(decide(SensorType::Routing, 0.99, 0.06), SensorDecision::Pass);
    }

    #[test]
    fn test_probability_extremes() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let never = sensor(SensorType::DataCheck, 0.0);
        let always = sensor(SensorType::DataCheck, 1.0);
        for _ in 0..500 {
            assert_eq!(evaluate(&never, &mut rng), SensorDecision::Pass);
            assert_eq!(evaluate(&always, &mut rng), SensorDecision::Fail);
        }
    }

    #[test]
    fn test_failure_rate_tracks_probability() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let s = sensor(SensorType::Routing, 0.2);
        let reworks = (0..10_000)
            .filter(|_| evaluate(&s, &mut rng) == SensorDecision::Rework)
            .count();
        assert!((1700..2300).contains(&reworks), "reworks = {}", reworks);
    }

    #[test]
    fn test_evaluate_through_dyn_rng() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let dyn_rng: &mut dyn rand::RngCore = &mut rng;
        let s = sensor(SensorType::ProcessDecision, 1.0);
        assert_eq!(evaluate(&s, dyn_rng), SensorDecision::SkipProcess);
    }
}
