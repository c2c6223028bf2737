//! # CADENCE Sim
//!
//! Runs a scripted driver-station session against the command scheduler:
//! wires a simulated robot (drivebase, lift, claw), paces the scheduler
//! with a [`CycleRunner`], and feeds scripted stick and button values
//! each cycle.
//!
//! Intended both as an end-to-end smoke test and as a worked example of
//! wiring subsystems, default commands, and trigger bindings.

mod robot;

use cadence_common::config::{ConfigError, ConfigLoader};
use cadence_runtime::{CycleRunner, RuntimeConfig, rt_setup};
use clap::Parser;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CADENCE Sim — scripted session against the command scheduler
#[derive(Parser, Debug)]
#[command(name = "cadence_sim")]
#[command(version)]
#[command(about = "Scripted driver-station session against the CADENCE scheduler")]
struct Args {
    /// Path to runtime configuration TOML.
    #[arg(default_value = "config/sim.toml")]
    config: PathBuf,

    /// Number of control cycles to run (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 600)]
    cycles: u64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let (config, config_note) = load_config(&args.config);
    setup_tracing(&args, &config);

    info!("CADENCE sim v{} starting...", env!("CARGO_PKG_VERSION"));
    if let Some(note) = config_note {
        warn!("{note}");
    }

    if let Err(e) = run(&args, &config) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("CADENCE sim shutdown complete");
}

/// Load the runtime config, falling back to defaults on any failure.
///
/// The fallback note is returned rather than logged because tracing is
/// not initialized yet (the config carries the log level).
fn load_config(path: &Path) -> (RuntimeConfig, Option<String>) {
    match RuntimeConfig::load(path) {
        Ok(config) => (config, None),
        Err(ConfigError::FileNotFound) => (
            RuntimeConfig::default(),
            Some(format!(
                "No config file at '{}', using defaults",
                path.display()
            )),
        ),
        Err(e) => (
            RuntimeConfig::default(),
            Some(format!("Config load failed ({e}), using defaults")),
        ),
    }
}

fn run(args: &Args, config: &RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!(
        "Config OK: cycle_time={}µs, service={}",
        config.cycle_time_us, config.shared.service_name
    );

    // RT setup (no-op without the `rt` feature).
    rt_setup(config.cpu_core, config.rt_priority)?;

    let mut runner = CycleRunner::new(config);
    let robot = robot::wire(runner.scheduler_mut())?;
    info!("Robot wired, entering cycle loop");

    // Graceful shutdown on Ctrl-C, checked at every cycle boundary.
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let completed = Cell::new(0_u64);
    runner.run_until(
        || {
            !running.load(Ordering::SeqCst)
                || (args.cycles != 0 && completed.get() >= args.cycles)
        },
        |cycle, _| {
            completed.set(cycle + 1);
            robot::script(cycle, &robot);
        },
    )?;

    runner.shutdown();

    let stats = runner.stats();
    info!(
        "Session done: {} cycles, avg={}ns max={}ns overruns={}",
        stats.cycle_count,
        stats.avg_cycle_ns(),
        stats.max_cycle_ns,
        stats.overruns
    );
    let (x, y, heading) = robot.drivebase.borrow().pose();
    info!(
        "Final pose: x={:.2} y={:.2} heading={:.2}, lift={:.1}, claw {}",
        x,
        y,
        heading,
        robot.lift.borrow().height(),
        if robot.claw.borrow().is_open() {
            "open"
        } else {
            "closed"
        }
    );

    Ok(())
}

/// Setup tracing from CLI arguments and the loaded config.
///
/// `--verbose` overrides the configured log level; `RUST_LOG` overrides
/// both.
fn setup_tracing(args: &Args, config: &RuntimeConfig) {
    let directive = if args.verbose {
        "debug"
    } else {
        config.shared.log_level.as_filter_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
