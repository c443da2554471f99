//! Simulated SMLM acquisition to a multi-page TIFF
//!
//! Builds a microscope from a JSON configuration (or the built-in defaults),
//! acquires a stack of frames and writes them as 16-bit pages. Per-frame
//! ground truth is logged at info level; a CSV of emitter states and a
//! resumable snapshot can be written alongside.
//!
//! Usage:
//! ```
//! cargo run --release --bin simulate_stack -- --config run.json --frames 500 -o stack.tif
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use shared::TiffStackWriter;
use smlm_simulator::hardware::models as camera_models;
use smlm_simulator::{Microscope, SimulationConfig, SimulationSnapshot, StateLogger};

/// Command-line arguments for stack simulation
#[derive(Parser, Debug)]
#[clap(author, version, about = "Simulate an SMLM acquisition into a TIFF stack")]
struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// Predefined camera overriding the configuration (scmos, emccd)
    #[clap(long)]
    camera: Option<String>,

    /// Number of frames to acquire
    #[clap(short = 'n', long, default_value = "100")]
    frames: usize,

    /// Output TIFF stack
    #[clap(short = 'o', long, default_value = "stack.tif")]
    output: PathBuf,

    /// Laser power for the whole run (clamped to the configured limits)
    #[clap(short = 'p', long)]
    power: Option<f64>,

    /// Random seed for reproducibility (optional)
    #[clap(long)]
    seed: Option<u64>,

    /// Write per-frame emitter states to this CSV file
    #[clap(long)]
    state_log: Option<PathBuf>,

    /// Resume from a snapshot written by a previous run with the same configuration
    #[clap(long)]
    resume: Option<PathBuf>,

    /// Save a snapshot after the last frame
    #[clap(long)]
    snapshot: Option<PathBuf>,

    /// Frames buffered between the simulation and the TIFF writer
    #[clap(long, default_value = "16")]
    buffer: usize,

    /// Print the effective configuration as JSON and exit
    #[clap(long)]
    print_config: bool,
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimulationConfig::default(),
    };

    if let Some(name) = &args.camera {
        config.camera = match name.to_lowercase().as_str() {
            "scmos" => camera_models::SCMOS.clone(),
            "emccd" => camera_models::EMCCD_512.clone(),
            other => anyhow::bail!("unknown camera '{other}', expected scmos or emccd"),
        };
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let mut microscope = Microscope::from_config(&config)?;
    if let Some(path) = &args.state_log {
        microscope = microscope.with_logger(
            StateLogger::open(path).with_context(|| format!("creating {}", path.display()))?,
        );
    }
    if let Some(path) = &args.resume {
        let snapshot = SimulationSnapshot::load(path)?;
        microscope.restore(&snapshot)?;
    }
    if let Some(power) = args.power {
        let applied = microscope.set_power(power);
        info!("Laser power set to {applied}");
    }

    let mut writer = TiffStackWriter::create(&args.output, args.buffer)?;
    for _ in 0..args.frames {
        let frame = microscope.next_frame()?;
        let truth = frame.ground_truth;
        info!(
            "frame {:>5}: emitting {:>4}, bleached {:>5}, photons {:>10.0}, power {:.3}",
            frame.index, truth.emitting_count, truth.bleached_count, truth.total_photons, truth.power
        );
        writer.write_frame(&frame.image)?;
    }
    let pages = writer.finish()?;
    info!("Wrote {} frames to {}", pages, args.output.display());

    if let Some(mut logger) = microscope.take_logger() {
        logger.flush()?;
        let rows = logger.close()?;
        info!("Logged {rows} emitter states");
    }
    if let Some(path) = &args.snapshot {
        microscope.snapshot().save(path)?;
        info!("Saved snapshot to {}", path.display());
    }
    Ok(())
}
