#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a crowd session over stdio.

mod settings;
mod transport;

use std::{
    fs,
    io::{self, BufReader},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use crowd_sim_controller::{wall_clock, CrowdController, CrowdService};
use crowd_sim_world::WalkableField;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "crowd-sim",
    version,
    about = "Simulate a crowd on the walkable paths of a map image"
)]
struct Args {
    /// Map image whose path-coloured pixels form the walkable area.
    #[arg(long)]
    map: PathBuf,
    /// Optional TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the seed from the settings file.
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides the broadcast interval in milliseconds.
    #[arg(long)]
    broadcast_ms: Option<u64>,
    /// Stops the session after this many seconds instead of running forever.
    #[arg(long)]
    duration_secs: Option<u64>,
}

/// Entry point for the crowd simulation command-line interface.
fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let settings = settings::load(args.config.as_deref())?;
    let seed = args.seed.unwrap_or(settings.seed);
    let interval = args
        .broadcast_ms
        .map_or_else(|| settings.broadcast_interval(), Duration::from_millis);
    let duration = args.duration_secs.map(Duration::from_secs);

    let bytes = fs::read(&args.map)
        .with_context(|| format!("failed to read map image at {}", args.map.display()))?;
    let field = WalkableField::from_image_bytes(&bytes, &settings.field_config())
        .with_context(|| format!("failed to derive walkable field from {}", args.map.display()))?;

    let controller = Arc::new(
        CrowdController::spawn(Arc::new(field), settings.controller_config(seed, wall_clock()))
            .context("failed to start crowd controller")?,
    );
    info!(seed, map = %args.map.display(), "crowd session started");

    let service: Arc<dyn CrowdService> = controller.clone();
    let _reader = transport::spawn_control_reader(service, BufReader::new(io::stdin()))?;

    let mut stdout = io::stdout().lock();
    let outcome = transport::broadcast(&*controller, &mut stdout, interval, duration);
    controller.stop();
    outcome
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}
