//! Flow Simulator: spawns parts, owns their agents and publishes station
//! telemetry.

use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use flowtwin_env::PlantContext;

use crate::agent::{AgentMode, Outcome, PartAgent, PartHandle, PartHandleRef, PartState};
use crate::config::SimulatorConfig;
use crate::event::{MetricReading, PlantEvent, StationStatusUpdate};
use crate::layout::{FactoryLayout, Route};
use crate::locks::LockManager;
use crate::model::StationStatus;
use crate::sink::EventSink;

/// Lifetime counters of a simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorStats {
    pub spawned: u64,
    pub resumed: u64,
    pub completed: u64,
    pub scrapped: u64,
    pub destroyed: u64,
}

type ActiveParts = Arc<Mutex<HashMap<String, PartHandle>>>;

/// The part-flow engine.
pub struct FlowSimulator<Ctx: PlantContext> {
    ctx: Arc<Ctx>,
    layout: Arc<FactoryLayout>,
    routes: Vec<Route>,
    locks: LockManager,
    sink: Arc<dyn EventSink>,
    config: SimulatorConfig,
    active: ActiveParts,
    stats: Arc<Mutex<SimulatorStats>>,
    counter: AtomicU64,
    running: AtomicBool,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl<Ctx: PlantContext> FlowSimulator<Ctx> {
    pub fn new(
        ctx: Arc<Ctx>,
        layout: Arc<FactoryLayout>,
        sink: Arc<dyn EventSink>,
        config: SimulatorConfig,
    ) -> Self {
        let routes = layout.routes();
        Self {
            ctx,
            layout,
            routes,
            locks: LockManager::new(),
            sink,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(Mutex::new(SimulatorStats::default())),
            counter: AtomicU64::new(0),
            running: AtomicBool::new(false),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub fn layout(&self) -> &Arc<FactoryLayout> {
        &self.layout
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SimulatorStats {
        *lock(&self.stats)
    }

    /// Publishes an idle status for every station and starts the spawn and
    /// metric loops.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            lines = self.routes.len(),
            stations = self.layout.stations.len(),
            seed = self.ctx.seed(),
            "flow simulator starting"
        );

        for id in self.station_ids() {
            let Some(station) = self.layout.station(&id) else { continue };
            self.sink.emit(PlantEvent::StationStatus(StationStatusUpdate {
                station_id: id.clone(),
                area: station.area.clone(),
                line: station.line.clone(),
                status: StationStatus::Idle,
                current_part_id: None,
                timestamp_ms: self.ctx.timestamp_ms(),
            }));
        }

        let mut loops = lock(&self.loops);
        if self.config.auto_spawn {
            let weak = Arc::downgrade(self);
            loops.push(self.ctx.spawn("spawn-loop", spawn_loop(weak)));
        }
        if self.config.publish_metrics {
            let weak = Arc::downgrade(self);
            loops.push(self.ctx.spawn("metric-loop", metric_loop(weak)));
        }
    }

    /// Destroys every live agent, then stops the simulator's own loops.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let handles: Vec<PartHandle> = lock(&self.active).drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.destroy();
        }
        lock(&self.stats).destroyed += handles.len() as u64;

        for task in lock(&self.loops).drain(..) {
            task.abort();
        }
        info!(destroyed = handles.len(), "flow simulator stopped");
    }

    /// Spawns a part on a randomly chosen line.
    pub fn spawn_part(&self) -> Option<String> {
        if self.routes.is_empty() {
            return None;
        }
        let idx = self.ctx.random_index(self.routes.len());
        let line_id = self.routes[idx].line_id.clone();
        self.spawn_part_on(&line_id)
    }

    /// Spawns a part at the entry station of `line_id`.
    pub fn spawn_part_on(&self, line_id: &str) -> Option<String> {
        let route = self.routes.iter().find(|r| r.line_id == line_id)?.clone();
        let entry = route.entry()?.to_string();

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let part_id = format!("{}-{:05}", self.config.part_id_prefix, n);
        info!(part = %part_id, line = %route.line_id, area = %route.area, "creating part");

        let initial = PartState::Entering {
            station: entry,
            skip_process: false,
        };
        self.launch(&part_id, route, AgentMode::Normal, initial);
        lock(&self.stats).spawned += 1;
        Some(part_id)
    }

    /// Puts a stopped part back on the belt `from -> to` in certified mode.
    ///
    /// Returns `None` if an agent for `part_id` is still live.
    pub fn resume_part(
        &self,
        part_id: &str,
        route: Route,
        from: &str,
        to: &str,
        after_position: f64,
        failed_sensor: Option<String>,
    ) -> Option<PartHandle> {
        if lock(&self.active).contains_key(part_id) {
            debug!(part = %part_id, "resume refused, agent still live");
            return None;
        }
        let initial = PartState::Resuming {
            from: from.to_string(),
            to: to.to_string(),
            after_position,
            failed_sensor,
        };
        let handle = self.launch(part_id, route, AgentMode::Certified, initial);
        lock(&self.stats).resumed += 1;
        Some(handle)
    }

    /// Destroys one live agent. Returns whether it existed.
    pub fn destroy_part(&self, part_id: &str) -> bool {
        let Some(handle) = lock(&self.active).remove(part_id) else {
            return false;
        };
        handle.destroy();
        lock(&self.stats).destroyed += 1;
        true
    }

    pub fn is_active(&self, part_id: &str) -> bool {
        lock(&self.active).contains_key(part_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Ids of live agents, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Publishes one sample per metric of every station.
    pub fn publish_metrics(&self) {
        for id in self.station_ids() {
            let Some(station) = self.layout.station(&id) else { continue };
            for spec in station.station_type.metrics() {
                let noise = match Normal::new(0.0, spec.variance / 4.0) {
                    Ok(normal) => self.ctx.with_rng(|rng| normal.sample(rng)),
                    Err(_) => 0.0,
                };
                let value = ((spec.base_value + noise) * 10.0).round() / 10.0;
                self.sink.emit(PlantEvent::Metric(MetricReading {
                    station_id: id.clone(),
                    area: station.area.clone(),
                    line: station.line.clone(),
                    metric_id: spec.metric_id.to_string(),
                    value,
                    unit: spec.unit.to_string(),
                    timestamp_ms: self.ctx.timestamp_ms(),
                }));
            }
        }
    }

    fn launch(&self, part_id: &str, route: Route, mode: AgentMode, initial: PartState) -> PartHandle {
        let agent = PartAgent::new(
            part_id,
            route,
            mode,
            self.ctx.clone(),
            self.layout.clone(),
            self.locks.clone(),
            self.sink.clone(),
            self.config.timing.clone(),
            self.config.exit_policy,
        );

        let active = self.active.clone();
        let stats = self.stats.clone();
        let on_finish = move |finished: &PartHandleRef, outcome: Outcome| {
            let remaining = {
                let mut map = lock(&active);
                if map.get(finished.part_id()).is_some_and(|h| finished.is(h)) {
                    map.remove(finished.part_id());
                }
                map.len()
            };
            let mut stats = lock(&stats);
            match outcome {
                Outcome::Completed => stats.completed += 1,
                Outcome::Scrapped => stats.scrapped += 1,
            }
            info!(part = %finished.part_id(), ?outcome, active = remaining, "part finished");
        };

        // Held across spawn so a fast agent cannot finish before it is listed.
        let mut map = lock(&self.active);
        let handle = agent.spawn(initial, on_finish);
        map.insert(part_id.to_string(), handle.clone());
        handle
    }

    /// Station ids in sorted order, so random draws happen in a stable order.
    fn station_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.layout.stations.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn spawn_loop<Ctx: PlantContext>(sim: Weak<FlowSimulator<Ctx>>) {
    loop {
        let Some(s) = sim.upgrade() else { return };
        if !s.is_running() {
            return;
        }
        let (min, max) = if s.active_count() < s.config.low_water {
            s.config.spawn_delay_low_ms
        } else {
            s.config.spawn_delay_high_ms
        };
        let delay = s.ctx.random_between(min, max);
        let ctx = s.ctx.clone();
        drop(s);

        ctx.sleep(Duration::from_millis(delay)).await;

        let Some(s) = sim.upgrade() else { return };
        if s.is_running() && s.active_count() < s.config.max_in_flight {
            s.spawn_part();
        }
    }
}

async fn metric_loop<Ctx: PlantContext>(sim: Weak<FlowSimulator<Ctx>>) {
    loop {
        let Some(s) = sim.upgrade() else { return };
        let interval = Duration::from_millis(s.config.metric_interval_ms.max(1));
        let ctx = s.ctx.clone();
        drop(s);

        ctx.sleep(interval).await;

        let Some(s) = sim.upgrade() else { return };
        if !s.is_running() {
            return;
        }
        s.publish_metrics();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::layout::{stations, LayoutBuilder};
    use crate::model::StationType;
    use crate::sink::MemorySink;
    use flowtwin_env::TokioContext;

    fn simulator(layout: FactoryLayout, config: SimulatorConfig) -> (Arc<FlowSimulator<TokioContext>>, MemorySink) {
        let sink = MemorySink::new();
        let sim = FlowSimulator::new(
            Arc::new(TokioContext::seeded(5)),
            Arc::new(layout),
            Arc::new(sink.clone()),
            config,
        );
        (Arc::new(sim), sink)
    }

    fn slow_line() -> FactoryLayout {
        LayoutBuilder::new()
            .line(
                "area",
                "line",
                "Line",
                &stations(&[("load", StationType::Load), ("pack", StationType::Pack)]),
            )
            .processing("load", 600_000, 600_000)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_publishes_idle_status_per_station() {
        let layout = FactoryLayout::standard();
        let config = SimulatorConfig {
            auto_spawn: false,
            publish_metrics: false,
            ..SimulatorConfig::default()
        };
        let (sim, sink) = simulator(layout, config);
        sim.start();

        let statuses: Vec<PlantEvent> = sink.drain();
        assert_eq!(statuses.len(), 200);
        assert!(statuses.iter().all(|e| matches!(
            e,
            PlantEvent::StationStatus(s) if s.status == StationStatus::Idle && s.current_part_id.is_none()
        )));
        sim.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_loop_caps_in_flight() {
        let config = SimulatorConfig {
            publish_metrics: false,
            ..SimulatorConfig::default()
        };
        let (sim, _sink) = simulator(slow_line(), config);
        sim.start();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(sim.active_count(), 10);
        assert_eq!(sim.stats().spawned, 10);
        assert_eq!(sim.active_ids()[0], "PART-00001");
        assert_eq!(sim.active_ids()[9], "PART-00010");

        // Only one part fits in the entry station.
        assert_eq!(sim.locks().held_count(), 1);
        sim.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_parts_leave_active_set() {
        let layout = LayoutBuilder::new()
            .line(
                "area",
                "line",
                "Line",
                &stations(&[("load", StationType::Load), ("pack", StationType::Pack)]),
            )
            .build();
        let config = SimulatorConfig {
            auto_spawn: false,
            publish_metrics: false,
            ..SimulatorConfig::default()
        };
        let (sim, sink) = simulator(layout, config);

        let id = sim.spawn_part_on("line").unwrap();
        assert_eq!(sim.active_count(), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(sim.active_count(), 0);
        assert_eq!(sim.stats().completed, 1);
        assert_eq!(sink.for_part(&id).last().map(|e| e.kind()), Some(EventKind::PartExit));
        assert!(sim.spawn_part_on("no-such-line").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metric_loop_publishes_rounded_samples() {
        let config = SimulatorConfig {
            auto_spawn: false,
            ..SimulatorConfig::default()
        };
        let layout = LayoutBuilder::new()
            .line(
                "area",
                "line",
                "Line",
                &stations(&[("mach", StationType::Machine), ("buf", StationType::Buffer)]),
            )
            .build();
        let (sim, sink) = simulator(layout, config);
        sim.start();
        sink.drain();

        tokio::time::sleep(Duration::from_millis(5100)).await;
        let metrics: Vec<MetricReading> = sink
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                PlantEvent::Metric(m) => Some(m),
                _ => None,
            })
            .collect();

        // Machine publishes vibration, power and temperature; buffers nothing.
        assert_eq!(metrics.len(), 3);
        for m in &metrics {
            assert_eq!(m.station_id, "mach");
            assert!(((m.value * 10.0).round() - m.value * 10.0).abs() < 1e-9);
        }
        sim.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_destroys_agents_and_silences() {
        let config = SimulatorConfig {
            publish_metrics: false,
            ..SimulatorConfig::default()
        };
        let (sim, sink) = simulator(slow_line(), config);
        sim.start();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sim.active_count() > 0);

        sim.stop();
        assert_eq!(sim.active_count(), 0);
        assert_eq!(sim.locks().held_count(), 0);
        assert!(!sim.is_running());

        let emitted = sink.events().len();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(sink.events().len(), emitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_part() {
        let config = SimulatorConfig {
            auto_spawn: false,
            publish_metrics: false,
            ..SimulatorConfig::default()
        };
        let (sim, _sink) = simulator(slow_line(), config);
        let id = sim.spawn_part_on("line").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sim.locks().held_count(), 1);

        assert!(sim.destroy_part(&id));
        assert!(!sim.destroy_part(&id));
        assert_eq!(sim.locks().held_count(), 0);
        assert_eq!(sim.stats().destroyed, 1);
    }
}
