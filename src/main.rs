// SPDX-License-Identifier: GPL-3.0-only

use camera_capture::CaptureConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-capture")]
#[command(about = "Camera preview pipeline: capture frames into a render texture")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Configuration file (default: <config dir>/camera-capture/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List {
        /// Use synthetic cameras instead of real devices
        #[arg(long = "virtual")]
        use_virtual: bool,
    },

    /// Show what a camera supports and what a resolution negotiates to
    Probe {
        /// Camera index to use (from 'camera-capture list')
        #[arg(short, long, default_value = "0")]
        camera: usize,

        /// Requested preview width
        #[arg(long, default_value = "1280")]
        width: u32,

        /// Requested preview height
        #[arg(long, default_value = "720")]
        height: u32,

        /// Use synthetic cameras instead of real devices
        #[arg(long = "virtual")]
        use_virtual: bool,
    },

    /// Print the rotation and mirroring applied for every facing and display rotation
    Orientation {
        /// Sensor mounting angle in degrees (0, 90, 180, 270)
        #[arg(short, long, default_value = "90")]
        sensor: i32,
    },

    /// Run the pipeline headless and report the render rate
    Preview {
        /// Camera to start with (0 = back, 1 = front)
        #[arg(short, long)]
        camera: Option<usize>,

        /// How long to run, in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Use synthetic cameras instead of real devices
        #[arg(long = "virtual")]
        use_virtual: bool,

        /// Save a JPEG of the last drawn frame when done
        #[arg(long)]
        snapshot: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_capture=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::load_or_default(),
    };

    match cli.command {
        Commands::List { use_virtual } => cli::list_cameras(&config, use_virtual),
        Commands::Probe {
            camera,
            width,
            height,
            use_virtual,
        } => cli::probe_camera(&config, camera, width, height, use_virtual),
        Commands::Orientation { sensor } => cli::print_orientation_table(sensor),
        Commands::Preview {
            camera,
            seconds,
            use_virtual,
            snapshot,
        } => cli::run_preview(config, camera, seconds, use_virtual, snapshot),
    }
}
