//! FlowTwin simulator CLI
//!
//! Run deterministic plant scenarios from a seed.

use clap::Parser;
use flowtwin_core::FactoryLayout;
use flowtwin_env::epoch_millis;
use flowtwin_sim::scenarios::ScenarioId;
use flowtwin_sim::{ScenarioResult, ScenarioRunner, SimError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::SystemTime;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// FlowTwin deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "flowtwin-sim")]
#[command(about = "Run deterministic factory digital-twin scenarios", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady_state, sensor_storm, rework_loop, congestion,
    /// operator_override, duplicate_delivery, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "300")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the final state and event log to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Plant layout JSON file (default: the standard 200-station plant)
    #[arg(long)]
    layout: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether every run passed.
fn run(args: Args) -> Result<bool, SimError> {
    // RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if !args.json {
        info!("FlowTwin simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(SimError::UnknownScenario)?]
    };

    let layout = match &args.layout {
        Some(path) => {
            let layout = FactoryLayout::from_file(path)?;
            info!(path = %path.display(), stations = layout.stations.len(), "loaded layout");
            layout
        }
        None => FactoryLayout::standard(),
    };

    let base_seed = if args.seed == 0 {
        epoch_millis(SystemTime::now())
    } else {
        args.seed
    };

    // --export captures a single run
    if let Some(path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            return Err(SimError::Usage("--export needs a single scenario and a single seed".to_string()));
        }
        let runner = ScenarioRunner::new(base_seed)
            .with_duration(args.duration)
            .with_layout(layout);
        let (result, export) = runner.run_with_export(scenarios[0])?;
        export.write_to_file(path)?;
        info!("Exported {} events to {}", export.events.len(), path.display());
        report(&args, &[result.clone()])?;
        return Ok(result.passed);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_layout(layout.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario)?;
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    report(&args, &all_results)?;
    Ok(all_results.iter().all(|r| r.passed))
}

fn report(args: &Args, results: &[ScenarioResult]) -> Result<(), SimError> {
    let total = results.len();
    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "timeSecs": r.final_time_secs,
                    "failureReason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    info!("");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for r in results {
        info!(
            "  {} seed={}: spawned={} completed={} scrapped={} resumed={} stopped={} rejected={}",
            r.scenario.name(),
            r.seed,
            r.metrics.parts_spawned,
            r.metrics.parts_completed,
            r.metrics.parts_scrapped,
            r.metrics.parts_resumed,
            r.metrics.stopped_on_belt,
            r.metrics.events_rejected,
        );
    }
    if failed.is_empty() {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed.len(), total);
        for r in failed {
            error!(
                "  - {} seed={}: {}",
                r.scenario.name(),
                r.seed,
                r.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }
    Ok(())
}
