//! Descriptive views beyond rankings and trends.
//!
//! These back the overview, listening-pattern and discovery panels of a
//! dashboard. All of them are pure functions over canonical events.

use crate::aggregate::{groups_by_id, GroupBy, GroupKey, Granularity};
use crate::types::PlayEvent;
use crate::{HistoryError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Plays at or above this length count as completed by default (3 minutes).
pub const DEFAULT_COMPLETION_THRESHOLD_MS: u64 = 180_000;

/// Headline numbers for a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningOverview {
    pub total_plays: usize,
    pub unique_tracks: usize,
    pub unique_artists: usize,
    /// Sum of known durations
    pub total_duration_ms: u64,
    /// Distinct UTC dates with at least one play
    pub active_days: usize,
    pub average_daily_plays: f64,
    /// Mean over plays with a known duration
    pub average_play_ms: Option<f64>,
    /// UTC hour with the most plays; the earliest hour wins ties
    pub most_active_hour: Option<u32>,
    /// Artist with the most plays, ties broken by name
    pub top_artist: Option<(String, usize)>,
    pub first_played_at: Option<DateTime<Utc>>,
    pub last_played_at: Option<DateTime<Utc>>,
}

pub fn overview(events: &[PlayEvent]) -> ListeningOverview {
    let by_id = groups_by_id(events, GroupBy::Track);
    let unique_tracks = events
        .iter()
        .map(|e| GroupKey::for_event(e, GroupBy::Track, by_id))
        .collect::<BTreeSet<_>>()
        .len();

    let mut artist_plays: BTreeMap<&str, usize> = BTreeMap::new();
    for event in events {
        *artist_plays.entry(event.artist_name()).or_insert(0) += 1;
    }
    let top_artist = artist_plays
        .iter()
        .fold(None::<(&str, usize)>, |best, (&name, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        })
        .map(|(name, count)| (name.to_string(), count));

    let active_days = events
        .iter()
        .map(|e| e.played_at().date_naive())
        .collect::<BTreeSet<NaiveDate>>()
        .len();

    let known: Vec<u64> = events
        .iter()
        .filter_map(|e| e.duration_played().as_millis())
        .collect();
    let total_duration_ms = known.iter().fold(0u64, |acc, ms| acc.saturating_add(*ms));

    let hours = hour_of_day_profile(events);
    let most_active_hour = hours
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .fold(None::<(usize, usize)>, |best, (hour, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((hour, count)),
        })
        .map(|(hour, _)| hour as u32);

    ListeningOverview {
        total_plays: events.len(),
        unique_tracks,
        unique_artists: artist_plays.len(),
        total_duration_ms,
        active_days,
        average_daily_plays: if active_days == 0 {
            0.0
        } else {
            events.len() as f64 / active_days as f64
        },
        average_play_ms: if known.is_empty() {
            None
        } else {
            Some(total_duration_ms as f64 / known.len() as f64)
        },
        most_active_hour,
        top_artist,
        first_played_at: events.iter().map(PlayEvent::played_at).min(),
        last_played_at: events.iter().map(PlayEvent::played_at).max(),
    }
}

/// Plays per UTC hour, index 0 = 00:00-00:59.
pub fn hour_of_day_profile(events: &[PlayEvent]) -> [usize; 24] {
    let mut hours = [0usize; 24];
    for event in events {
        hours[event.played_at().hour() as usize] += 1;
    }
    hours
}

/// Plays per weekday, Monday first. Always seven entries.
pub fn weekday_profile(events: &[PlayEvent]) -> Vec<(Weekday, usize)> {
    let mut days = [0usize; 7];
    for event in events {
        days[event.played_at().weekday().num_days_from_monday() as usize] += 1;
    }

    let mut weekday = Weekday::Mon;
    days.iter()
        .map(|&count| {
            let entry = (weekday, count);
            weekday = weekday.succ();
            entry
        })
        .collect()
}

/// Number of distinct artists heard in each non-empty bucket.
///
/// # Errors
///
/// [`HistoryError::InvalidRequest`] for [`Granularity::None`].
pub fn artist_diversity(
    events: &[PlayEvent],
    granularity: Granularity,
) -> Result<Vec<(DateTime<Utc>, usize)>> {
    if granularity == Granularity::None {
        return Err(HistoryError::InvalidRequest(
            "artist diversity needs a day, week or month granularity".to_string(),
        ));
    }

    let mut buckets: BTreeMap<DateTime<Utc>, BTreeSet<&str>> = BTreeMap::new();
    for event in events {
        if let Some(start) = granularity.bucket_start(event.played_at()) {
            buckets.entry(start).or_default().insert(event.artist_name());
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(start, artists)| (start, artists.len()))
        .collect())
}

/// How plays ended (`trackdone`, `fwdbtn`, ...), most common first.
///
/// Events without an end reason are left out.
pub fn end_reason_breakdown(events: &[PlayEvent]) -> Vec<(String, usize)> {
    let mut reasons: HashMap<&str, usize> = HashMap::new();
    for reason in events.iter().filter_map(PlayEvent::reason_end) {
        *reasons.entry(reason).or_insert(0) += 1;
    }

    let mut breakdown: Vec<(String, usize)> = reasons
        .into_iter()
        .map(|(reason, count)| (reason.to_string(), count))
        .collect();
    breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    breakdown
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CompletionBreakdown {
    pub completed: usize,
    pub skipped: usize,
    /// Plays with no known duration
    pub unknown: usize,
}

impl CompletionBreakdown {
    /// Share of plays with a known duration that were completed.
    pub fn completion_rate(&self) -> Option<f64> {
        let known = self.completed + self.skipped;
        (known > 0).then(|| self.completed as f64 / known as f64)
    }
}

/// Split plays into completed (duration ≥ `threshold_ms`) and skipped.
pub fn completion_breakdown(events: &[PlayEvent], threshold_ms: u64) -> CompletionBreakdown {
    events
        .iter()
        .fold(CompletionBreakdown::default(), |mut acc, event| {
            match event.duration_played().as_millis() {
                Some(ms) if ms >= threshold_ms => acc.completed += 1,
                Some(_) => acc.skipped += 1,
                None => acc.unknown += 1,
            }
            acc
        })
}
