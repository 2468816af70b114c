mod commands;

use clap::Parser;
use commands::{execute_command, Commands};
use spotify_history::AnalyzerConfig;
use std::path::PathBuf;

/// Spotify streaming-history analyser
#[derive(Parser)]
#[command(
    name = "spotify-history",
    about = "Top tracks, top artists and listening trends from Spotify streaming history",
    long_about = None
)]
struct Cli {
    /// Show detailed debug information
    #[arg(long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if args.verbose {
        println!("🔍 Verbose mode enabled");
    }

    let config = match AnalyzerConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = execute_command(args.command, &config).await {
        eprintln!("❌ Command failed: {e}");
        std::process::exit(1);
    }

    Ok(())
}
