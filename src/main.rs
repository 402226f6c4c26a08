// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-session")]
#[command(about = "Drive a simulated camera capture session")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/camera-session/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras and microphones
    List,

    /// Take one or more photos
    Photo {
        /// Camera id to use (from 'camera-session list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Number of overlapping captures
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Disable Live Photo companions
        #[arg(long)]
        no_live: bool,

        /// Library directory (default: ~/Pictures/Camera)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record a movie
    Video {
        /// Camera id to use (from 'camera-session list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "3")]
        duration: u64,

        /// Record in 10-bit HDR when the camera supports it
        #[arg(long)]
        hdr: bool,

        /// Library directory (default: ~/Pictures/Camera)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_session=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(camera_session::Config::default_path);

    match cli.command {
        Commands::List => cli::list_cameras(config_path),
        Commands::Photo {
            camera,
            count,
            no_live,
            output,
        } => cli::take_photos(config_path, camera, count, !no_live, output),
        Commands::Video {
            camera,
            duration,
            hdr,
            output,
        } => cli::record_video(config_path, camera, duration, hdr, output),
    }
}
