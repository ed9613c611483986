//! Duet CLI: stack two recordings into one portrait movie.
//!
//! Usage:
//!   duet compose <TOP> <BOTTOM>   Render the stacked movie
//!   duet plan <TOP> <BOTTOM>      Print the composition plan as JSON
//!   duet probe <FILE>             Show clip information
//!   duet check                    Check ffmpeg capabilities

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use duet_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "duet",
    about = "Stack two clips into a single portrait movie",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $DUET_CONFIG, then the XDG config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stack TOP above BOTTOM and render a .mov file
    Compose {
        /// Clip shown in the upper half; its audio is kept
        top: PathBuf,

        /// Clip shown in the lower half
        bottom: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Encoder quality: highest|balanced|fast
        #[arg(long)]
        quality: Option<String>,

        /// Bottom region after a shorter bottom clip ends: blank|hold
        #[arg(long)]
        tail_fill: Option<String>,

        /// Probe the rendered file and write a verification report
        #[arg(long)]
        verify: bool,
    },

    /// Print the composition plan without rendering
    Plan {
        /// Clip shown in the upper half
        top: PathBuf,

        /// Clip shown in the lower half
        bottom: PathBuf,
    },

    /// Show clip information
    Probe {
        /// Path to the media file
        path: PathBuf,

        /// Print the probed clip as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    duet_common::logging::init_logging(&logging);
    tracing::debug!(
        config = ?cli.config,
        ffmpeg = %config.compose.ffmpeg_bin,
        fps = config.compose.fps,
        "Configuration loaded"
    );

    let settings = config.compose;
    match cli.command {
        Commands::Compose {
            top,
            bottom,
            output,
            fps,
            quality,
            tail_fill,
            verify,
        } => {
            let overrides = commands::compose::Overrides {
                fps,
                quality,
                tail_fill,
                verify,
            };
            commands::compose::run(settings, top, bottom, output, overrides).await
        }
        Commands::Plan { top, bottom } => commands::plan::run(settings, top, bottom),
        Commands::Probe { path, json } => commands::probe::run(settings, path, json),
        Commands::Check => commands::check::run(settings),
    }
}
