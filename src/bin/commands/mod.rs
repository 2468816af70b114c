pub mod fetch;
pub mod output;
pub mod overview;
pub mod sample;
pub mod top;
pub mod utils;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use spotify_history::{AnalyzerConfig, Granularity, GroupBy, InputFormat, Metric};
use std::path::PathBuf;

/// The history file to analyse
#[derive(Args, Clone)]
pub struct InputArgs {
    /// Path to a streaming-history export (.csv, .tsv, .json)
    pub file: PathBuf,

    /// Input format; inferred from the file extension when omitted
    #[arg(long)]
    pub format: Option<InputFormat>,
}

/// How to rank plays
#[derive(Args, Clone)]
pub struct RankArgs {
    /// Rank tracks or artists
    #[arg(long, default_value = "track")]
    pub group_by: GroupBy,

    /// Rank by number of plays or by total listening time
    #[arg(long, default_value = "plays")]
    pub metric: Metric,

    /// Number of entries to show
    #[arg(long, default_value = "10")]
    pub top_n: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the most played tracks or artists in an export
    ///
    /// Usage examples:
    /// # Top 10 tracks by play count
    /// spotify-history top StreamingHistory0.json
    ///
    /// # Top 5 artists by listening time
    /// spotify-history top history.csv --group-by artist --metric duration --top-n 5
    Top {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        rank: RankArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show plays per day, week or month
    ///
    /// Usage examples:
    /// # Weekly listening trend
    /// spotify-history trend StreamingHistory0.json --granularity week
    Trend {
        #[command(flatten)]
        input: InputArgs,

        /// Bucket size
        #[arg(long, default_value = "month")]
        granularity: Granularity,

        /// Print the trend as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show headline numbers and listening patterns
    ///
    /// Usage examples:
    /// spotify-history overview StreamingHistory0.json
    Overview {
        #[command(flatten)]
        input: InputArgs,

        /// Print the overview as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch recently played tracks from the Web API and rank them
    ///
    /// Reads the token from SPOTIFY_ACCESS_TOKEN, or refreshes one using
    /// SPOTIFY_CLIENT_ID, SPOTIFY_CLIENT_SECRET and SPOTIFY_REFRESH_TOKEN.
    ///
    /// Usage examples:
    /// # Everything the API still remembers
    /// spotify-history fetch
    ///
    /// # Top artists since the start of the month
    /// spotify-history fetch --after 2024-06-01T00:00:00Z --group-by artist
    Fetch {
        /// Only keep plays at or after this instant (RFC 3339)
        #[arg(long)]
        after: Option<DateTime<Utc>>,

        /// Only keep plays before this instant (RFC 3339)
        #[arg(long)]
        before: Option<DateTime<Utc>>,

        #[command(flatten)]
        rank: RankArgs,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyse generated demonstration data
    ///
    /// Usage examples:
    /// spotify-history sample --count 500 --seed 7
    Sample {
        /// Number of plays to generate
        #[arg(long, default_value = "1000")]
        count: usize,

        /// Random seed; the same seed and end time give the same data
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Latest instant of the generated year (RFC 3339), defaults to now
        #[arg(long)]
        end: Option<DateTime<Utc>>,

        /// Number of entries in each top list
        #[arg(long, default_value = "10")]
        top_n: usize,
    },
}

pub async fn execute_command(
    command: Commands,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Top { input, rank, json } => top::handle_top(&input, &rank, json, config),
        Commands::Trend {
            input,
            granularity,
            json,
        } => top::handle_trend(&input, granularity, json, config),
        Commands::Overview { input, json } => overview::handle_overview(&input, json, config),
        Commands::Fetch {
            after,
            before,
            rank,
            json,
        } => fetch::handle_fetch(after, before, &rank, json, config).await,
        Commands::Sample {
            count,
            seed,
            end,
            top_n,
        } => sample::handle_sample(count, seed, end.unwrap_or_else(Utc::now), top_n, config),
    }
}
