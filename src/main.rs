use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use intersection_sim::simulation::{
    ControllerMode, IntersectionSelection, LaneWeighting, RunnerConfig, SimConfig,
    SimulationHandle, SimulationSnapshot, SimWorld, TopologyConfig,
};

#[derive(Parser)]
#[command(name = "intersection_sim")]
#[command(about = "Multi-intersection adaptive traffic signal simulation")]
struct Cli {
    /// Simulated seconds to run (defaults to the configured time limit)
    #[arg(long)]
    seconds: Option<u32>,

    /// Simulation settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Road layout as JSON (defaults to two linked intersections)
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Pace the simulation to wall-clock time on a background thread
    #[arg(long)]
    realtime: bool,

    /// Hold all signals red until an override picks a direction
    #[arg(long)]
    manual: bool,

    /// Print a JSON snapshot every N simulated seconds
    #[arg(long, value_name = "SECS")]
    snapshot_every: Option<u32>,

    /// Spawn at intersections in turn instead of at random
    #[arg(long)]
    round_robin: bool,

    /// Favor the straight lane when spawning
    #[arg(long)]
    straight_bias: bool,

    /// Queue a green request at startup, as NAME:DIRECTION (e.g. A:south)
    #[arg(long = "override", value_name = "NAME:DIRECTION")]
    overrides: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,intersection_sim=info"),
    )
    .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let topology = match &cli.topology {
        Some(path) => TopologyConfig::load(path)?,
        None => TopologyConfig::default(),
    };

    let mut world = SimWorld::from_config(config, &topology, cli.seed)?;
    for request in &cli.overrides {
        apply_override(&mut world, request)?;
    }

    if cli.realtime {
        run_realtime(world, cli.snapshot_every)
    } else {
        run_headless(world, cli.snapshot_every)
    }
}

fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => SimConfig::load(path)?,
        None => SimConfig::default(),
    };
    if let Some(seconds) = cli.seconds {
        config.simulation_time_secs = seconds;
    }
    if cli.manual {
        config.controller_mode = ControllerMode::Manual;
    }
    if cli.round_robin {
        config.spawn.intersection_selection = IntersectionSelection::RoundRobin;
    }
    if cli.straight_bias {
        config.spawn.lane_weighting = LaneWeighting::StraightBiased;
    }
    config.validate()?;
    Ok(config)
}

fn apply_override(world: &mut SimWorld, request: &str) -> Result<()> {
    let (name, direction) = request
        .split_once(':')
        .with_context(|| format!("Override '{}' is not NAME:DIRECTION", request))?;
    let id = world
        .intersection_id(name)
        .with_context(|| format!("Unknown intersection '{}'", name))?;
    let direction = world.set_override(id, direction)?;
    info!("Queued {} ({}) as next green at {}", direction, direction.label(), name);
    Ok(())
}

fn print_snapshot(snapshot: &SimulationSnapshot) -> Result<()> {
    let json = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
    println!("{}", json);
    Ok(())
}

/// Run the simulation in headless mode, as fast as possible
fn run_headless(mut world: SimWorld, snapshot_every: Option<u32>) -> Result<()> {
    println!("Running intersection simulation in headless mode...");
    println!(
        "Simulating {}s at {} ticks per second",
        world.config.simulation_time_secs,
        world.clock.tick_rate()
    );
    println!();

    println!("Initial state:");
    world.print_summary();
    println!();

    let mut last_snapshot = 0;
    while !world.is_finished() {
        world.tick();

        let seconds = world.clock.seconds();
        if let Some(every) = snapshot_every.filter(|&every| every > 0) {
            if seconds >= last_snapshot + u64::from(every) {
                last_snapshot = seconds;
                print_snapshot(&world.snapshot())?;
            }
        }
    }

    world.log_final_stats();
    println!("=== Final State ===");
    world.print_summary();
    Ok(())
}

/// Run the simulation on the background runner, printing frames as they come
fn run_realtime(world: SimWorld, snapshot_every: Option<u32>) -> Result<()> {
    let runner_config = RunnerConfig {
        ticks_per_frame: 1,
        realtime: true,
        stop_at_time_limit: true,
    };
    let mut handle = SimulationHandle::new(world, runner_config);
    let frames = handle.frames();
    handle.start()?;

    let mut last_snapshot = 0.0;
    while handle.is_running() {
        let Some(frame) = frames.wait_take(Duration::from_millis(250)) else {
            continue;
        };
        if let Some(every) = snapshot_every.filter(|&every| every > 0) {
            if frame.elapsed_secs >= last_snapshot + every as f32 {
                last_snapshot = frame.elapsed_secs;
                print_snapshot(&frame)?;
            }
        }
    }

    handle.wait()?;
    handle.with_world(|world| world.print_summary())?;
    Ok(())
}
