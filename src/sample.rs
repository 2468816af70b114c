//! Synthetic streaming history for demonstrations.
//!
//! Output is a JSON document in the shape of Spotify's account-data export
//! (`endTime`, `artistName`, `trackName`, `msPlayed`), so it goes through the
//! same parser and normalizer as a real upload. A given seed and end time
//! always produce the same document.

use crate::{HistoryError, Result};
use chrono::{DateTime, Duration, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

const ARTISTS: [&str; 10] = [
    "Taylor Swift",
    "Drake",
    "Bad Bunny",
    "The Weeknd",
    "Ariana Grande",
    "Ed Sheeran",
    "Billie Eilish",
    "Post Malone",
    "Dua Lipa",
    "Harry Styles",
];

/// Relative popularity of [`ARTISTS`], in percent.
const ARTIST_WEIGHTS: [u32; 10] = [15, 12, 10, 10, 10, 10, 8, 8, 8, 9];

const TRACK_STEMS: [&str; 8] = [
    "Song A", "Song B", "Song C", "Song D", "Song E", "Song F", "Song G", "Song H",
];

const START_REASONS: [&str; 3] = ["trackdone", "fwdbtn", "playbtn"];
const END_REASONS: [&str; 3] = ["trackdone", "logout", "endplay"];

/// One generated stream, serialized with the export's key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleStream {
    #[serde(rename = "endTime")]
    pub end_time: String,
    #[serde(rename = "artistName")]
    pub artist_name: String,
    #[serde(rename = "trackName")]
    pub track_name: String,
    #[serde(rename = "msPlayed")]
    pub ms_played: u64,
    pub reason_start: String,
    pub reason_end: String,
}

/// Generate `count` streams spread over the year before `end`.
pub fn generate(count: usize, seed: u64, end: DateTime<Utc>) -> Result<Vec<SampleStream>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let artists =
        WeightedIndex::new(ARTIST_WEIGHTS).map_err(|e| HistoryError::Config(e.to_string()))?;
    let start = end - Duration::days(365);

    let streams = (0..count)
        .map(|_| {
            let played_at = start
                + Duration::days(rng.gen_range(0..365))
                + Duration::hours(rng.gen_range(0..24))
                + Duration::minutes(rng.gen_range(0..60));
            let artist = ARTISTS[artists.sample(&mut rng)];
            let stem = TRACK_STEMS[rng.gen_range(0..TRACK_STEMS.len())];

            SampleStream {
                end_time: played_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                artist_name: artist.to_string(),
                track_name: format!("{stem} - {artist}"),
                ms_played: rng.gen_range(30_000..250_000),
                reason_start: START_REASONS[rng.gen_range(0..START_REASONS.len())].to_string(),
                reason_end: END_REASONS[rng.gen_range(0..END_REASONS.len())].to_string(),
            }
        })
        .collect();

    Ok(streams)
}

/// [`generate`], serialized as a nested (JSON array) document.
pub fn generate_json(count: usize, seed: u64, end: DateTime<Utc>) -> Result<String> {
    let streams = generate(count, seed, end)?;
    serde_json::to_string(&streams)
        .map_err(|e| HistoryError::Parse(format!("Failed to serialize sample data: {e}")))
}
