//! Override/Resume Orchestrator: puts a part stopped by a failed data check
//! back on its belt and drives it to completion in certified mode.

use std::sync::Arc;
use tracing::{debug, info};

use flowtwin_env::PlantContext;

use crate::agent::PartHandle;
use crate::command::OverrideCommand;
use crate::event::{PartOverride, PlantEvent};
use crate::layout::Route;
use crate::simulator::FlowSimulator;
use crate::sink::EventSink;
use crate::tracker::StateTracker;

/// Where a stopped part gets back on the belt.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub from: String,
    pub to: String,
    /// Position of the failed sensor; only sensors beyond it are replayed
    pub after_position: f64,
    pub failed_sensor: Option<String>,
    pub route: Route,
}

pub struct OverrideOrchestrator<Ctx: PlantContext> {
    ctx: Arc<Ctx>,
    simulator: Arc<FlowSimulator<Ctx>>,
    sink: Arc<dyn EventSink>,
}

impl<Ctx: PlantContext> OverrideOrchestrator<Ctx> {
    pub fn new(ctx: Arc<Ctx>, simulator: Arc<FlowSimulator<Ctx>>, sink: Arc<dyn EventSink>) -> Self {
        Self { ctx, simulator, sink }
    }

    /// Works out where the part resumes. Command fields win over the
    /// tracker's recorded stop.
    pub fn resolve(&self, tracker: &StateTracker, cmd: &OverrideCommand) -> Option<ResumePoint> {
        let part = tracker.part(&cmd.part_id)?;
        let stop = part.stop.as_ref()?;
        let layout = self.simulator.layout();

        let from = cmd.from_station_id.clone().unwrap_or_else(|| stop.from_station_id.clone());
        let to = cmd.to_station_id.clone().unwrap_or_else(|| stop.to_station_id.clone());
        layout.station(&from)?;
        layout.station(&to)?;

        let failed = cmd
            .failed_sensor_id
            .as_deref()
            .or(stop.sensor_id.as_deref())
            .and_then(|id| layout.sensor(id));
        let after_position = failed.map(|s| s.position_on_belt).unwrap_or(0.0);
        let failed_sensor = failed.map(|s| s.sensor_id.clone());

        let route = part
            .current_line
            .as_deref()
            .and_then(|line| self.simulator.routes().iter().find(|r| r.line_id == line).cloned())
            .or_else(|| layout.route_for_station(&to))?;

        Some(ResumePoint {
            from,
            to,
            after_position,
            failed_sensor,
            route,
        })
    }

    /// Handles an override command. Returns the resumed agent, or `None` if
    /// the part cannot be overridden.
    pub fn handle(&self, tracker: &StateTracker, cmd: &OverrideCommand) -> Option<PartHandle> {
        if !tracker.can_override(&cmd.part_id) {
            debug!(part = %cmd.part_id, "override rejected, part is not stopped");
            return None;
        }
        if self.simulator.is_active(&cmd.part_id) {
            debug!(part = %cmd.part_id, "override rejected, already resuming");
            return None;
        }
        let Some(point) = self.resolve(tracker, cmd) else {
            debug!(part = %cmd.part_id, "override rejected, stop point unresolved");
            return None;
        };

        self.sink.emit(PlantEvent::PartOverride(PartOverride {
            part_id: cmd.part_id.clone(),
            area: point.route.area.clone(),
            line: point.route.line_id.clone(),
            timestamp_ms: self.ctx.timestamp_ms(),
        }));
        info!(
            part = %cmd.part_id,
            from = %point.from,
            to = %point.to,
            after = point.after_position,
            "override accepted, resuming part"
        );

        self.simulator
            .resume_part(
                &cmd.part_id,
                point.route,
                &point.from,
                &point.to,
                point.after_position,
                point.failed_sensor,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::event::EventKind;
    use crate::layout::{stations, LayoutBuilder};
    use crate::model::{ExitResult, PartStatus, SensorDecision, SensorType, StationType};
    use crate::sink::MemorySink;
    use crate::tracker::TrackerConfig;
    use flowtwin_env::TokioContext;
    use std::time::Duration;

    struct Rig {
        sim: Arc<FlowSimulator<TokioContext>>,
        orchestrator: OverrideOrchestrator<TokioContext>,
        tracker: StateTracker,
        sink: MemorySink,
    }

    impl Rig {
        fn new() -> Self {
            let layout = Arc::new(
                LayoutBuilder::new()
                    .line(
                        "area",
                        "line",
                        "Line",
                        &stations(&[
                            ("load", StationType::Load),
                            ("mach", StationType::Machine),
                            ("pack", StationType::Pack),
                        ]),
                    )
                    .sensor("s-1", SensorType::DataCheck, "load", "mach", 0.3, 1.0)
                    .sensor("s-2", SensorType::Routing, "load", "mach", 0.6, 1.0)
                    .sensor("s-3", SensorType::DataCheck, "mach", "pack", 0.5, 1.0)
                    .build(),
            );
            let ctx = Arc::new(TokioContext::seeded(21));
            let sink = MemorySink::new();
            let config = SimulatorConfig {
                auto_spawn: false,
                publish_metrics: false,
                ..SimulatorConfig::default()
            };
            let sim = Arc::new(FlowSimulator::new(ctx.clone(), layout.clone(), Arc::new(sink.clone()), config));
            let orchestrator = OverrideOrchestrator::new(ctx, sim.clone(), Arc::new(sink.clone()));
            Self {
                sim,
                orchestrator,
                tracker: StateTracker::new(layout, TrackerConfig::default()),
                sink,
            }
        }

        fn pump(&mut self) -> Vec<PlantEvent> {
            let events = self.sink.drain();
            for event in &events {
                self.tracker.apply(event);
            }
            events
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_resumes_to_completion() {
        let mut rig = Rig::new();
        let id = rig.sim.spawn_part_on("line").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        rig.pump();

        let stop = rig.tracker.part(&id).unwrap().stop.clone().unwrap();
        assert_eq!(stop.sensor_id.as_deref(), Some("s-1"));
        assert!(rig.tracker.can_override(&id));
        assert_eq!(rig.sim.active_count(), 0);

        let handle = rig.orchestrator.handle(&rig.tracker, &OverrideCommand::new(&id));
        assert!(handle.is_some());
        tokio::time::sleep(Duration::from_secs(120)).await;
        let resumed = rig.pump();

        assert_eq!(resumed.first().map(|e| e.kind()), Some(EventKind::PartOverride));
        let part = rig.tracker.part(&id).unwrap();
        assert_eq!(part.status, PartStatus::Completed);
        assert!(part.stop.is_none());

        let mut replayed = Vec::new();
        for event in &resumed {
            match event {
                PlantEvent::SensorTrigger(t) => {
                    assert_eq!(t.decision, SensorDecision::Pass);
                    replayed.push(t.sensor_id.clone());
                }
                PlantEvent::PartExit(e) => assert_eq!(e.result, ExitResult::Ok),
                PlantEvent::TransitStop(_) => panic!("resumed part stopped again"),
                _ => {}
            }
        }
        // The failed sensor is not replayed; the ones after it pass.
        assert_eq!(replayed, vec!["s-2".to_string(), "s-3".to_string()]);
        assert_eq!(rig.sim.locks().held_count(), 0);
        assert_eq!(rig.sim.stats().resumed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_override_of_running_part_is_noop() {
        let mut rig = Rig::new();
        let id = rig.sim.spawn_part_on("line").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        rig.pump();

        assert!(rig.orchestrator.handle(&rig.tracker, &OverrideCommand::new(&id)).is_none());
        assert!(rig.orchestrator.handle(&rig.tracker, &OverrideCommand::new("ghost")).is_none());
        assert_eq!(rig.sink.count(EventKind::PartOverride), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_override_while_resuming_is_rejected() {
        let mut rig = Rig::new();
        let id = rig.sim.spawn_part_on("line").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        rig.pump();

        let cmd = OverrideCommand::new(&id);
        assert!(rig.orchestrator.handle(&rig.tracker, &cmd).is_some());
        // Tracker has not seen the override yet, the live agent blocks a repeat.
        assert!(rig.orchestrator.handle(&rig.tracker, &cmd).is_none());
        assert_eq!(rig.sink.count(EventKind::PartOverride), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_prefers_command_fields() {
        let mut rig = Rig::new();
        let id = rig.sim.spawn_part_on("line").unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        rig.pump();

        let cmd = OverrideCommand {
            part_id: id.clone(),
            from_station_id: None,
            to_station_id: None,
            failed_sensor_id: Some("s-2".into()),
        };
        let point = rig.orchestrator.resolve(&rig.tracker, &cmd).unwrap();
        assert_eq!(point.from, "load");
        assert_eq!(point.to, "mach");
        assert_eq!(point.after_position, 0.6);
        assert_eq!(point.failed_sensor.as_deref(), Some("s-2"));
        assert_eq!(point.route.line_id, "line");

        let bad = OverrideCommand {
            to_station_id: Some("nowhere".into()),
            ..cmd
        };
        assert!(rig.orchestrator.resolve(&rig.tracker, &bad).is_none());
    }
}
