//! Headless particle-life runner.
//!
//! Configuration comes from the environment:
//!   PLIFE_SEED          fixed RNG seed (default: OS entropy)
//!   PLIFE_WIDTH/HEIGHT  world extents (default 400x400)
//!   PLIFE_DENSITY       particles per unit area (default 0.002)
//!   PLIFE_TYPES         particle type count (default 6)
//!   PLIFE_HEAT          thermal jitter (default 0)
//!   PLIFE_FRAMES        frames to simulate (default 600)
//!   PLIFE_SNAPSHOT_IN   JSON snapshot to load before running
//!   PLIFE_SNAPSHOT_OUT  JSON snapshot to write after running
//!
//! Log verbosity follows RUST_LOG.

mod command;

use anyhow::{Context, Result};
use command::CommandBus;
use plife_core::{Command, LifeConfig, StandardForceLaw, WorldSnapshot, WorldState};
use std::env;
use std::fs;
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> Result<()> {
    init_tracing();
    let frames: u64 = env_parse("PLIFE_FRAMES", 600);
    let mut world = bootstrap_world()?;

    let (bus, drain) = command::open(64);
    let controller = spawn_demo_controller(bus);

    for _ in 0..frames {
        drain.apply_to(&mut world);
        world.step(&StandardForceLaw);
        if world.frame() % 100 == 0 {
            info!(
                frame = world.frame(),
                particles = world.store().len(),
                types = world.matrix().size(),
                avg_frame_ms = world.average_frame_ms(),
                "progress",
            );
        }
    }

    if let Ok(path) = env::var("PLIFE_SNAPSHOT_OUT") {
        let json = serde_json::to_string_pretty(&world.snapshot())?;
        fs::write(&path, json).with_context(|| format!("writing snapshot to {path}"))?;
        info!(%path, "snapshot written");
    }

    drop(drain);
    if controller.join().is_err() {
        warn!("demo controller thread panicked");
    }
    info!(
        frames = world.frame(),
        avg_frame_ms = world.average_frame_ms(),
        "run complete",
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_world() -> Result<WorldState> {
    let config = LifeConfig {
        world_width: env_parse("PLIFE_WIDTH", 400.0),
        world_height: env_parse("PLIFE_HEIGHT", 400.0),
        particle_density: env_parse("PLIFE_DENSITY", 0.002),
        type_count: env_parse("PLIFE_TYPES", 6),
        heat: env_parse("PLIFE_HEAT", 0.0),
        rng_seed: env::var("PLIFE_SEED").ok().and_then(|v| v.parse().ok()),
        ..LifeConfig::default()
    };
    let mut world = WorldState::new(config)?;

    if let Ok(path) = env::var("PLIFE_SNAPSHOT_IN") {
        let json = fs::read_to_string(&path).with_context(|| format!("reading snapshot {path}"))?;
        let snapshot: WorldSnapshot =
            serde_json::from_str(&json).with_context(|| format!("parsing snapshot {path}"))?;
        world.load_snapshot(snapshot)?;
        info!(%path, particles = world.store().len(), "snapshot loaded");
    }

    info!(
        particles = world.store().len(),
        types = world.matrix().size(),
        "world ready",
    );
    Ok(world)
}

/// Background thread exercising the command bus: reshuffles the matrix a
/// couple of times while the run is in flight.
fn spawn_demo_controller(bus: CommandBus) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for _ in 0..2 {
            thread::sleep(Duration::from_millis(250));
            if !bus.submit(Command::RandomizeMatrix) {
                break;
            }
        }
    })
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
