/*!
# Capture Simulator

Runs the camera controller model with a synthetic sensor, decodes the host
byte bus and saves the reassembled frames as `.raw` files.

## Features

- Test pattern or synthetic sensor pixel source
- Configurable `full` stall schedule on the host bus
- Frame synchronization on the frame-id/EOF header bits
- Timestamped capture directory per session
- Live output mode (one JSON line per frame on stdout)

## Usage

### From a configuration file (default)
```bash
camsim --config camsim.toml
```

### Command line
```bash
camsim run --source sensor --frames 5 --output-dir ./frames
```

### Live output (no file saving)
```bash
camsim run --live --stall-every 100 --stall-for 40
```
*/

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gateware::PixelSourceKind;
use tracing::info;

mod capture;
mod config;
mod frame_sync;

use capture::CaptureSession;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "camsim")]
#[command(about = "Camera controller simulation and frame capture")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "camsim.toml")]
    config: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Source {
    Pattern,
    Sensor,
}

impl From<Source> for PixelSourceKind {
    fn from(source: Source) -> Self {
        match source {
            Source::Pattern => PixelSourceKind::TestPattern,
            Source::Sensor => PixelSourceKind::Sensor,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a capture session
    Run {
        /// Pixel source feeding the packetizer
        #[arg(short, long, value_enum, default_value = "pattern")]
        source: Source,

        /// Output directory for .raw files
        #[arg(short, long, default_value = "./frames")]
        output_dir: String,

        /// Frames to capture (0 = until Ctrl+C)
        #[arg(short, long, default_value = "10")]
        frames: u64,

        /// Bus ticks to simulate (0 = no limit)
        #[arg(long, default_value = "0")]
        ticks: u64,

        /// Assert `full` every N bus ticks (0 = never)
        #[arg(long, default_value = "0")]
        stall_every: u64,

        /// Length of each stall in bus ticks
        #[arg(long, default_value = "0")]
        stall_for: u64,

        /// Enable live output mode (no file saving)
        #[arg(long)]
        live: bool,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "camsim.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stderr keeps stdout clean for live output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match cli.command {
        Some(Commands::Run {
            source,
            output_dir,
            frames,
            ticks,
            stall_every,
            stall_for,
            live,
        }) => {
            let mut config = AppConfig::new();
            config.controller.bus.source = source.into();
            config.capture.output_directory = output_dir;
            config.capture.max_frames = frames;
            config.capture.max_bus_ticks = ticks;
            config.capture.stall_every_ticks = stall_every;
            config.capture.stall_for_ticks = stall_for;
            config.capture.live_output = live;
            config.capture.enable_storage = !live;
            run_capture(config)
        }

        Some(Commands::Config { output }) => generate_config_file(output),

        None => {
            let config = AppConfig::load_from_file(&cli.config)?;
            info!("Starting capture from config: {}", cli.config.display());
            run_capture(config)
        }
    }
}

/// Run one capture session, stopping early on Ctrl+C
fn run_capture(config: AppConfig) -> Result<()> {
    let mut session = CaptureSession::new(config);

    let running = session.running_flag();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        running.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let summary = session.start().context("Capture failed")?;

    info!(
        "Capture completed: {} frames from {} packets in {} bus ticks ({} sync errors, {} write errors)",
        summary.frames_written,
        summary.packets,
        summary.bus_ticks,
        summary.sync.sync_errors,
        summary.file_write_errors
    );
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    info!("Generated configuration file: {}", output_path.display());
    info!("Edit the file to customize settings, then run: camsim --config {}", output_path.display());

    Ok(())
}
