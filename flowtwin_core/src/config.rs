//! Timing and policy configuration for the part agents and the flow simulator.

use std::time::Duration;

/// Timing knobs of the part agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    /// Retry interval of a blocked lock acquisition (default: 500 ms)
    pub lock_poll_ms: u64,

    /// Interval between `PartProcess` progress reports (default: 2000 ms)
    pub progress_tick_ms: u64,

    /// Upper bound of the random progress jitter, in percent (default: 5)
    pub progress_jitter: f64,

    /// Dwell time at a station whose processing is skipped (default: 500 ms)
    pub skip_process_ms: u64,

    /// Belt transit time range (default: 3000..=6000 ms)
    pub transit_ms: (u64, u64),

    /// Lower bound on the delay before each sensor (default: 100 ms)
    pub min_sensor_delay_ms: u64,

    /// Lower bound on the wait after the last sensor (default: 200 ms)
    pub min_remaining_transit_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            lock_poll_ms: 500,
            progress_tick_ms: 2000,
            progress_jitter: 5.0,
            skip_process_ms: 500,
            transit_ms: (3000, 6000),
            min_sensor_delay_ms: 100,
            min_remaining_transit_ms: 200,
        }
    }
}

impl Timing {
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }
}

/// Verdict thresholds for stations that roll one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPolicy {
    /// Samples below this are `nok` (default: 0.03)
    pub nok_below: f64,

    /// Samples below this (and not `nok`) are `rework` (default: 0.15)
    pub rework_below: f64,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            nok_below: 0.03,
            rework_below: 0.15,
        }
    }
}

/// Configuration of the flow simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub timing: Timing,
    pub exit_policy: ExitPolicy,

    /// Below this many live parts the short spawn delay applies (default: 5)
    pub low_water: usize,

    /// No part is created while this many are live (default: 10)
    pub max_in_flight: usize,

    /// Spawn delay while under `low_water` (default: 3000..=6000 ms)
    pub spawn_delay_low_ms: (u64, u64),

    /// Spawn delay otherwise (default: 8000..=15000 ms)
    pub spawn_delay_high_ms: (u64, u64),

    /// Station metric publication interval (default: 5000 ms)
    pub metric_interval_ms: u64,

    /// Part id prefix (default: "PART")
    pub part_id_prefix: String,

    /// Whether `start()` launches the spawn loop
    pub auto_spawn: bool,

    /// Whether `start()` launches the metric loop
    pub publish_metrics: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            exit_policy: ExitPolicy::default(),
            low_water: 5,
            max_in_flight: 10,
            spawn_delay_low_ms: (3000, 6000),
            spawn_delay_high_ms: (8000, 15000),
            metric_interval_ms: 5000,
            part_id_prefix: "PART".to_string(),
            auto_spawn: true,
            publish_metrics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SimulatorConfig::default();
        assert_eq!(cfg.timing.lock_poll(), Duration::from_millis(500));
        assert_eq!(cfg.timing.transit_ms, (3000, 6000));
        assert!(cfg.exit_policy.nok_below < cfg.exit_policy.rework_below);
        assert!(cfg.low_water < cfg.max_in_flight);
        assert_eq!(cfg.part_id_prefix, "PART");
    }
}
