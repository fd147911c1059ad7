//! Part Agent: one explicit state machine per part.
//!
//! ```text
//!            ┌──────────────────── rework sensor (reverse belt) ─────┐
//!            ▼                                                       │
//! Entering ──► Processing ──► ExitEvaluating ──► Transiting ─────────┘
//!    ▲  │                         │    │             │
//!    │  └── skip_process ─────────┘    │             ├──► Scrapped (data-check fail)
//!    │                                 │             │
//!    └─────────────────────────────────┼─────────────┘
//!                                      ├──► Completed (end of route)
//!                                      └──► Scrapped  (nok)
//!
//! Resuming ──► Entering   (operator override, certified mode)
//! ```
//!
//! Each state owns the lock guards it holds, so leaving a state (or
//! aborting the task) releases them. The only suspension points are
//! `PlantContext::sleep` calls.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

use flowtwin_env::PlantContext;

use crate::config::{ExitPolicy, Timing};
use crate::event::*;
use crate::layout::{FactoryLayout, Route};
use crate::locks::{LockGuard, LockManager, ResourceKey};
use crate::model::{ExitResult, SensorConfig, SensorDecision};
use crate::routing::{self, NextHop};
use crate::sensor::evaluate;
use crate::sink::EventSink;

/// How an agent makes its decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Verdicts and sensor outcomes are rolled.
    Normal,
    /// The operator certified the part: every exit is `ok` and every sensor
    /// passes without sampling.
    Certified,
}

/// Lifecycle state of a part agent.
pub enum PartState {
    Entering { station: String, skip_process: bool },
    Processing { station: String, guard: LockGuard },
    ExitEvaluating { station: String, guard: LockGuard, cycle_time_ms: u64 },
    Transiting { from: String, to: String, skip_process: bool },
    /// Back on the belt `from -> to` after an override. Sensors after
    /// `failed_sensor` in belt order are replayed; without it, those past
    /// `after_position`.
    Resuming {
        from: String,
        to: String,
        after_position: f64,
        failed_sensor: Option<String>,
    },
    Completed,
    Scrapped,
}

impl PartState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PartState::Completed | PartState::Scrapped)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PartState::Entering { .. } => "entering",
            PartState::Processing { .. } => "processing",
            PartState::ExitEvaluating { .. } => "exit_evaluating",
            PartState::Transiting { .. } => "transiting",
            PartState::Resuming { .. } => "resuming",
            PartState::Completed => "completed",
            PartState::Scrapped => "scrapped",
        }
    }
}

impl fmt::Debug for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartState::Entering { station, skip_process } => {
                write!(f, "Entering({}, skip={})", station, skip_process)
            }
            PartState::Processing { station, .. } => write!(f, "Processing({})", station),
            PartState::ExitEvaluating { station, cycle_time_ms, .. } => {
                write!(f, "ExitEvaluating({}, {}ms)", station, cycle_time_ms)
            }
            PartState::Transiting { from, to, skip_process } => {
                write!(f, "Transiting({} -> {}, skip={})", from, to, skip_process)
            }
            PartState::Resuming { from, to, after_position, .. } => {
                write!(f, "Resuming({} -> {}, after={})", from, to, after_position)
            }
            PartState::Completed => write!(f, "Completed"),
            PartState::Scrapped => write!(f, "Scrapped"),
        }
    }
}

/// Terminal outcome of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Scrapped,
}

/// Handle to a running agent. Cloning yields another handle to the same
/// agent.
#[derive(Debug, Clone)]
pub struct PartHandle {
    part_id: String,
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
    locks: LockManager,
}

impl PartHandle {
    pub fn part_id(&self) -> &str {
        &self.part_id
    }

    /// Stops the agent for good.
    ///
    /// After this returns the agent emits nothing more and holds no lock,
    /// even though the aborted task is dropped by the runtime later.
    pub fn destroy(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
        let released = self.locks.release_holder(&self.part_id);
        debug!(part = %self.part_id, released, "part agent destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    /// Whether `other` controls the same agent.
    pub fn same_agent(&self, other: &PartHandle) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Drives one part along its route.
pub struct PartAgent<Ctx: PlantContext> {
    part_id: String,
    route: Route,
    mode: AgentMode,
    ctx: Arc<Ctx>,
    layout: Arc<FactoryLayout>,
    locks: LockManager,
    sink: Arc<dyn EventSink>,
    timing: Timing,
    exit_policy: ExitPolicy,
    cancelled: Arc<AtomicBool>,
}

impl<Ctx: PlantContext> PartAgent<Ctx> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        part_id: &str,
        route: Route,
        mode: AgentMode,
        ctx: Arc<Ctx>,
        layout: Arc<FactoryLayout>,
        locks: LockManager,
        sink: Arc<dyn EventSink>,
        timing: Timing,
        exit_policy: ExitPolicy,
    ) -> Self {
        Self {
            part_id: part_id.to_string(),
            route,
            mode,
            ctx,
            layout,
            locks,
            sink,
            timing,
            exit_policy,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn part_id(&self) -> &str {
        &self.part_id
    }

    /// Spawns the agent starting in `initial`. `on_finish` runs when the
    /// agent reaches a terminal state (not when it is destroyed).
    pub fn spawn<F>(self, initial: PartState, on_finish: F) -> PartHandle
    where
        F: FnOnce(&PartHandleRef, Outcome) + Send + 'static,
    {
        let part_id = self.part_id.clone();
        let cancelled = self.cancelled.clone();
        let locks = self.locks.clone();
        let ctx = self.ctx.clone();
        let finish_ref = PartHandleRef {
            part_id: part_id.clone(),
            cancelled: cancelled.clone(),
        };

        let task = ctx.spawn(&format!("part-{}", part_id), async move {
            let outcome = self.run(initial).await;
            if !finish_ref.cancelled.load(Ordering::SeqCst) {
                on_finish(&finish_ref, outcome);
            }
        });

        PartHandle {
            part_id,
            cancelled,
            abort: task.abort_handle(),
            locks,
        }
    }

    /// Steps the state machine until it reaches a terminal state.
    pub async fn run(&self, initial: PartState) -> Outcome {
        let mut state = initial;
        loop {
            match state {
                PartState::Completed => {
                    debug!(part = %self.part_id, "journey completed");
                    return Outcome::Completed;
                }
                PartState::Scrapped => {
                    debug!(part = %self.part_id, "journey ended as scrap");
                    return Outcome::Scrapped;
                }
                other => state = self.step(other).await,
            }
        }
    }

    /// Performs one transition.
    pub async fn step(&self, state: PartState) -> PartState {
        match state {
            PartState::Entering { station, skip_process } => self.enter(station, skip_process).await,
            PartState::Processing { station, guard } => self.process(station, guard).await,
            PartState::ExitEvaluating { station, guard, cycle_time_ms } => {
                self.exit(station, guard, cycle_time_ms)
            }
            PartState::Transiting { from, to, skip_process } => self.transit(from, to, skip_process).await,
            PartState::Resuming {
                from,
                to,
                after_position,
                failed_sensor,
            } => self.resume(from, to, after_position, failed_sensor).await,
            terminal => terminal,
        }
    }

    // ========================================================================
    // STATES
    // ========================================================================

    async fn enter(&self, station: String, skip_process: bool) -> PartState {
        let guard = self
            .locks
            .acquire(&*self.ctx, ResourceKey::station(&station), &self.part_id, self.timing.lock_poll())
            .await;

        self.emit(PlantEvent::PartEnter(PartEnter {
            part_id: self.part_id.clone(),
            station_id: station.clone(),
            area: self.route.area.clone(),
            line: self.route.line_id.clone(),
            timestamp_ms: self.ctx.timestamp_ms(),
        }));

        if skip_process {
            self.ctx.sleep(Duration::from_millis(self.timing.skip_process_ms)).await;
            return PartState::ExitEvaluating {
                station,
                guard,
                cycle_time_ms: 0,
            };
        }
        PartState::Processing { station, guard }
    }

    async fn process(&self, station: String, guard: LockGuard) -> PartState {
        let (min, max) = self
            .layout
            .station(&station)
            .map(|s| s.processing_time_ms)
            .unwrap_or((0, 0));
        let duration = self.ctx.random_between(min, max);
        let tick = self.timing.progress_tick_ms.max(1);
        let step = 100.0 / (duration.max(1) as f64 / tick as f64);

        let mut elapsed = 0;
        let mut progress: f64 = 0.0;
        while elapsed + tick < duration {
            self.ctx.sleep(Duration::from_millis(tick)).await;
            elapsed += tick;
            progress = (progress + step + self.ctx.random_unit() * self.timing.progress_jitter).min(99.0);
            self.emit(PlantEvent::PartProcess(PartProcess {
                part_id: self.part_id.clone(),
                station_id: station.clone(),
                area: self.route.area.clone(),
                line: self.route.line_id.clone(),
                progress_pct: progress.round(),
                timestamp_ms: self.ctx.timestamp_ms(),
            }));
        }
        self.ctx.sleep(Duration::from_millis(duration - elapsed)).await;

        PartState::ExitEvaluating {
            station,
            guard,
            cycle_time_ms: duration,
        }
    }

    fn exit(&self, station: String, guard: LockGuard, cycle_time_ms: u64) -> PartState {
        let Some(config) = self.layout.station(&station) else {
            debug!(part = %self.part_id, station = %station, "station missing from layout, ending journey");
            return PartState::Completed;
        };

        let result = match self.mode {
            AgentMode::Certified => ExitResult::Ok,
            AgentMode::Normal => {
                routing::roll_verdict(config.station_type, self.ctx.random_unit(), &self.exit_policy)
            }
        };

        self.emit(PlantEvent::PartExit(PartExit {
            part_id: self.part_id.clone(),
            station_id: station.clone(),
            area: self.route.area.clone(),
            line: self.route.line_id.clone(),
            result,
            cycle_time_ms,
            timestamp_ms: self.ctx.timestamp_ms(),
        }));
        drop(guard);

        match routing::next_hop(config, result, &self.route, |n| self.ctx.random_index(n)) {
            NextHop::Scrap => PartState::Scrapped,
            NextHop::Complete => PartState::Completed,
            NextHop::Transit { from, to } => PartState::Transiting {
                from,
                to,
                skip_process: false,
            },
        }
    }

    async fn transit(&self, from: String, to: String, skip_process: bool) -> PartState {
        let guard = self.acquire_belt(&from, &to).await;
        let transit_ms = self.transit_time();
        self.emit_transit_start(&from, &to, transit_ms);

        let sensors = self.layout.sensors_on(&from, &to);
        if sensors.is_empty() {
            self.ctx.sleep(Duration::from_millis(transit_ms)).await;
            drop(guard);
            return PartState::Entering { station: to, skip_process };
        }

        let mut skip_process = skip_process;
        let mut prev = 0.0;
        for sensor in sensors {
            self.ctx.sleep(self.sensor_delay(transit_ms, sensor.position_on_belt - prev)).await;
            prev = sensor.position_on_belt;

            let decision = match self.mode {
                AgentMode::Certified => SensorDecision::Pass,
                AgentMode::Normal => self.ctx.with_rng(|rng| evaluate(sensor, rng)),
            };
            self.emit_trigger(sensor, decision);

            match decision {
                SensorDecision::Pass => {}
                SensorDecision::SkipProcess => skip_process = true,
                SensorDecision::Fail => {
                    drop(guard);
                    self.emit(PlantEvent::TransitStop(TransitStop {
                        part_id: self.part_id.clone(),
                        area: self.route.area.clone(),
                        line: self.route.line_id.clone(),
                        from_station_id: from,
                        to_station_id: to,
                        reason: REASON_SENSOR_DATA_CHECK_FAIL.to_string(),
                        sensor_id: Some(sensor.sensor_id.clone()),
                        timestamp_ms: self.ctx.timestamp_ms(),
                    }));
                    return PartState::Scrapped;
                }
                SensorDecision::Rework => {
                    drop(guard);
                    debug!(part = %self.part_id, sensor = %sensor.sensor_id, "routing sensor sent part back");
                    return PartState::Transiting {
                        from: to,
                        to: from,
                        skip_process: false,
                    };
                }
            }
        }

        self.ctx.sleep(self.remaining_transit(transit_ms, prev)).await;
        drop(guard);
        PartState::Entering { station: to, skip_process }
    }

    async fn resume(
        &self,
        from: String,
        to: String,
        after_position: f64,
        failed_sensor: Option<String>,
    ) -> PartState {
        let guard = self.acquire_belt(&from, &to).await;
        let transit_ms = self.transit_time();

        // Belt order breaks position ties with the failed sensor
        let sensors = self.layout.sensors_on(&from, &to);
        let first = match failed_sensor
            .as_deref()
            .and_then(|id| sensors.iter().position(|s| s.sensor_id == id))
        {
            Some(idx) => idx + 1,
            None => sensors
                .iter()
                .position(|s| s.position_on_belt > after_position)
                .unwrap_or(sensors.len()),
        };

        let mut prev = after_position;
        for sensor in &sensors[first..] {
            self.ctx.sleep(self.sensor_delay(transit_ms, sensor.position_on_belt - prev)).await;
            prev = sensor.position_on_belt;
            self.emit_trigger(sensor, SensorDecision::Pass);
        }

        self.emit_transit_start(&from, &to, transit_ms);
        self.ctx.sleep(Duration::from_millis(transit_ms)).await;
        drop(guard);
        PartState::Entering {
            station: to,
            skip_process: false,
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn acquire_belt(&self, from: &str, to: &str) -> LockGuard {
        self.locks
            .acquire(&*self.ctx, ResourceKey::belt(from, to), &self.part_id, self.timing.lock_poll())
            .await
    }

    fn transit_time(&self) -> u64 {
        let (min, max) = self.timing.transit_ms;
        self.ctx.random_between(min, max)
    }

    fn sensor_delay(&self, transit_ms: u64, fraction: f64) -> Duration {
        let ms = (transit_ms as f64 * fraction).max(self.timing.min_sensor_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }

    fn remaining_transit(&self, transit_ms: u64, last_position: f64) -> Duration {
        let ms = (transit_ms as f64 * (1.0 - last_position)).max(self.timing.min_remaining_transit_ms as f64);
        Duration::from_millis(ms as u64)
    }

    fn emit_transit_start(&self, from: &str, to: &str, transit_ms: u64) {
        self.emit(PlantEvent::TransitStart(TransitStart {
            part_id: self.part_id.clone(),
            area: self.route.area.clone(),
            line: self.route.line_id.clone(),
            from_station_id: from.to_string(),
            to_station_id: to.to_string(),
            transit_time_ms: transit_ms,
            timestamp_ms: self.ctx.timestamp_ms(),
        }));
    }

    fn emit_trigger(&self, sensor: &SensorConfig, decision: SensorDecision) {
        debug!(part = %self.part_id, sensor = %sensor.sensor_id, ?decision, "sensor evaluated");
        self.emit(PlantEvent::SensorTrigger(SensorTrigger {
            sensor_id: sensor.sensor_id.clone(),
            part_id: self.part_id.clone(),
            area: self.route.area.clone(),
            line: self.route.line_id.clone(),
            sensor_type: sensor.sensor_type,
            decision,
            from_station_id: sensor.from_station_id.clone(),
            to_station_id: sensor.to_station_id.clone(),
            timestamp_ms: self.ctx.timestamp_ms(),
        }));
    }

    fn emit(&self, event: PlantEvent) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.sink.emit(event);
    }
}

/// What an `on_finish` callback learns about the agent that finished.
#[derive(Debug, Clone)]
pub struct PartHandleRef {
    part_id: String,
    cancelled: Arc<AtomicBool>,
}

impl PartHandleRef {
    pub fn part_id(&self) -> &str {
        &self.part_id
    }

    /// Whether `handle` controls the agent that finished.
    pub fn is(&self, handle: &PartHandle) -> bool {
        Arc::ptr_eq(&self.cancelled, &handle.cancelled)
    }
}
