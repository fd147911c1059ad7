//! Plant scenarios for deterministic simulation runs.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// FT-001: default plant, default rates
    SteadyState,

    /// FT-002: sensor failure rates multiplied, many belt stops
    SensorStorm,

    /// FT-003: measuring stations send most parts back for rework
    ReworkLoop,

    /// FT-004: many parts in flight, short spawn delays
    Congestion,

    /// FT-005: sensor stops resolved by operator overrides
    OperatorOverride,

    /// FT-006: at-least-once bus delivery
    DuplicateDelivery,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyState,
            ScenarioId::SensorStorm,
            ScenarioId::ReworkLoop,
            ScenarioId::Congestion,
            ScenarioId::OperatorOverride,
            ScenarioId::DuplicateDelivery,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyState => "steady_state",
            ScenarioId::SensorStorm => "sensor_storm",
            ScenarioId::ReworkLoop => "rework_loop",
            ScenarioId::Congestion => "congestion",
            ScenarioId::OperatorOverride => "operator_override",
            ScenarioId::DuplicateDelivery => "duplicate_delivery",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyState => "Default plant and rates, tracker invariants hold",
            ScenarioId::SensorStorm => "Sensor failure rates x5, every stop recorded with its sensor",
            ScenarioId::ReworkLoop => "60% rework verdicts, parts cycle back and never scrap at exit",
            ScenarioId::Congestion => "40 parts in flight, stations stay mutually exclusive",
            ScenarioId::OperatorOverride => "Sensor stops overridden every 10s, resumed parts never stop again",
            ScenarioId::DuplicateDelivery => "30% duplicate delivery, counters match a clean run",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_state" | "steadystate" | "ft-001" => Ok(ScenarioId::SteadyState),
            "sensor_storm" | "sensorstorm" | "ft-002" => Ok(ScenarioId::SensorStorm),
            "rework_loop" | "reworkloop" | "ft-003" => Ok(ScenarioId::ReworkLoop),
            "congestion" | "ft-004" => Ok(ScenarioId::Congestion),
            "operator_override" | "operatoroverride" | "ft-005" => Ok(ScenarioId::OperatorOverride),
            "duplicate_delivery" | "duplicatedelivery" | "ft-006" => Ok(ScenarioId::DuplicateDelivery),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
