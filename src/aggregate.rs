//! Aggregator: top-N rankings and time-bucketed trends over canonical events.
//!
//! Everything here is a pure function of its inputs. Rankings are sorted by
//! the requested metric, descending, with ties broken by the group key in
//! ascending order, so repeated calls produce identical output.

use crate::types::PlayEvent;
use crate::{HistoryError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ================================================================================================
// REQUEST
// ================================================================================================

/// What to rank by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Number of plays
    Plays,
    /// Total known milliseconds played
    Duration,
}

/// What to group plays into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Track,
    Artist,
}

/// Width of trend buckets. All truncation happens in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    /// ISO week, starting Monday 00:00
    Week,
    Month,
    /// No trend series
    None,
}

macro_rules! string_enum {
    ($ty:ident, $what:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = HistoryError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    other => Err(HistoryError::InvalidRequest(format!(
                        concat!("unknown ", $what, " '{}' (expected one of: {})"),
                        other,
                        [$($name),+].join(", ")
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($ty::$variant => $name,)+
                };
                f.write_str(name)
            }
        }
    };
}

string_enum!(Metric, "metric", { "plays" => Plays, "duration" => Duration });
string_enum!(GroupBy, "group_by", { "track" => Track, "artist" => Artist });
string_enum!(Granularity, "granularity", {
    "day" => Day,
    "week" => Week,
    "month" => Month,
    "none" => None,
});

impl Granularity {
    /// Start of the bucket containing `at`, or `None` when trends are off.
    pub fn bucket_start(self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = at.date_naive();
        let start = match self {
            Granularity::None => return None,
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        };
        Some(start.and_time(NaiveTime::MIN).and_utc())
    }
}

/// Parameters for one [`aggregate`] call.
///
/// # Examples
///
/// ```rust
/// use spotify_history::{AggregateRequest, Granularity, GroupBy, Metric};
///
/// let request = AggregateRequest::from_parts("duration", "artist", 5, "month").unwrap();
/// assert_eq!(request.metric, Metric::Duration);
/// assert_eq!(request.group_by, GroupBy::Artist);
/// assert_eq!(request.trend_granularity, Granularity::Month);
///
/// assert!(AggregateRequest::from_parts("plays", "track", 0, "none").is_err());
/// assert!(AggregateRequest::from_parts("bogus", "track", 3, "none").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub metric: Metric,
    pub group_by: GroupBy,
    /// Maximum number of ranked entries; must be positive
    pub top_n: usize,
    pub trend_granularity: Granularity,
}

impl Default for AggregateRequest {
    fn default() -> Self {
        Self {
            metric: Metric::Plays,
            group_by: GroupBy::Track,
            top_n: 10,
            trend_granularity: Granularity::None,
        }
    }
}

impl AggregateRequest {
    pub fn new(metric: Metric, group_by: GroupBy, top_n: usize) -> Self {
        Self {
            metric,
            group_by,
            top_n,
            trend_granularity: Granularity::None,
        }
    }

    pub fn with_trend(mut self, granularity: Granularity) -> Self {
        self.trend_granularity = granularity;
        self
    }

    /// Build a validated request from loosely-typed caller input.
    pub fn from_parts(metric: &str, group_by: &str, top_n: i64, granularity: &str) -> Result<Self> {
        let top_n = usize::try_from(top_n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                HistoryError::InvalidRequest(format!("top_n must be positive, got {top_n}"))
            })?;

        let request = Self {
            metric: metric.parse()?,
            group_by: group_by.parse()?,
            top_n,
            trend_granularity: granularity.parse()?,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(HistoryError::InvalidRequest(
                "top_n must be positive, got 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ================================================================================================
// SUMMARY TABLES
// ================================================================================================

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Track name or artist name, depending on the grouping
    pub entity_name: String,
    /// Artist of a ranked track; `None` when ranking artists
    pub artist_name: Option<String>,
    /// Track id when the ranking was grouped by id
    pub source_id: Option<String>,
    pub play_count: usize,
    /// Sum of known durations in milliseconds
    pub total_duration_ms: u64,
    /// Plays that did not contribute to `total_duration_ms`
    pub unknown_duration_plays: usize,
}

impl RankedEntry {
    fn metric_value(&self, metric: Metric) -> u64 {
        match metric {
            Metric::Plays => self.play_count as u64,
            Metric::Duration => self.total_duration_ms,
        }
    }
}

impl fmt::Display for RankedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artist_name {
            Some(artist) => write!(f, "{} - {}", artist, self.entity_name),
            None => write!(f, "{}", self.entity_name),
        }
    }
}

/// Plays within one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket_start: DateTime<Utc>,
    pub play_count: usize,
    pub total_duration_ms: u64,
}

/// Result of an [`aggregate`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub request: AggregateRequest,
    pub ranking: Vec<RankedEntry>,
    /// `None` when the request's granularity is `none`
    pub trend: Option<Vec<TrendPoint>>,
}

// ================================================================================================
// GROUPING
// ================================================================================================

/// Identity under which plays are grouped. Orders lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    SourceId(String),
    TrackArtist(String, String),
    Artist(String),
}

impl GroupKey {
    /// Key for one event. `by_id` selects id grouping for tracks.
    pub fn for_event(event: &PlayEvent, group_by: GroupBy, by_id: bool) -> Self {
        match (group_by, event.source_id()) {
            (GroupBy::Artist, _) => GroupKey::Artist(event.artist_name().to_string()),
            (GroupBy::Track, Some(id)) if by_id => GroupKey::SourceId(id.to_string()),
            (GroupBy::Track, _) => GroupKey::TrackArtist(
                event.track_name().to_string(),
                event.artist_name().to_string(),
            ),
        }
    }
}

/// Tracks are grouped by id only when every event carries one.
pub fn groups_by_id(events: &[PlayEvent], group_by: GroupBy) -> bool {
    group_by == GroupBy::Track
        && !events.is_empty()
        && events.iter().all(|e| e.source_id().is_some())
}

// ================================================================================================
// AGGREGATION
// ================================================================================================

/// Compute the ranking, and the trend series if requested.
///
/// # Errors
///
/// [`HistoryError::InvalidRequest`] when `request.top_n` is zero.
///
/// # Examples
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use spotify_history::{aggregate, AggregateRequest, GroupBy, Metric, PlayEvent, PlayedDuration};
///
/// let at = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();
/// let events = vec![
///     PlayEvent::new("A", "X", at(0)).with_duration(PlayedDuration::Known(1000)),
///     PlayEvent::new("A", "X", at(1)).with_duration(PlayedDuration::Known(2000)),
///     PlayEvent::new("B", "Y", at(2)).with_duration(PlayedDuration::Known(500)),
/// ];
///
/// let summary = aggregate(&events, &AggregateRequest::new(Metric::Plays, GroupBy::Track, 2)).unwrap();
/// assert_eq!(summary.ranking[0].entity_name, "A");
/// assert_eq!(summary.ranking[0].play_count, 2);
/// assert_eq!(summary.ranking[0].total_duration_ms, 3000);
/// ```
pub fn aggregate(events: &[PlayEvent], request: &AggregateRequest) -> Result<Summary> {
    request.validate()?;

    let ranking = rank(events, request.metric, request.group_by, request.top_n)?;
    let trend = match request.trend_granularity {
        Granularity::None => None,
        granularity => Some(trend(events, granularity)),
    };

    Ok(Summary {
        request: request.clone(),
        ranking,
        trend,
    })
}

/// Top `top_n` groups by `metric`.
pub fn rank(
    events: &[PlayEvent],
    metric: Metric,
    group_by: GroupBy,
    top_n: usize,
) -> Result<Vec<RankedEntry>> {
    if top_n == 0 {
        return Err(HistoryError::InvalidRequest(
            "top_n must be positive, got 0".to_string(),
        ));
    }

    let by_id = groups_by_id(events, group_by);
    let mut groups: BTreeMap<GroupKey, RankedEntry> = BTreeMap::new();

    for event in events {
        let key = GroupKey::for_event(event, group_by, by_id);
        let entry = groups.entry(key).or_insert_with(|| RankedEntry {
            entity_name: match group_by {
                GroupBy::Track => event.track_name().to_string(),
                GroupBy::Artist => event.artist_name().to_string(),
            },
            artist_name: match group_by {
                GroupBy::Track => Some(event.artist_name().to_string()),
                GroupBy::Artist => None,
            },
            source_id: if by_id {
                event.source_id().map(str::to_string)
            } else {
                None
            },
            play_count: 0,
            total_duration_ms: 0,
            unknown_duration_plays: 0,
        });

        entry.play_count += 1;
        match event.duration_played().as_millis() {
            Some(ms) => entry.total_duration_ms = entry.total_duration_ms.saturating_add(ms),
            None => entry.unknown_duration_plays += 1,
        }
    }

    log::debug!(
        "Ranking {} {group_by} groups by {metric} (grouped by id: {by_id})",
        groups.len()
    );

    // BTreeMap iteration is key-ascending and the sort is stable
    let mut ranking: Vec<RankedEntry> = groups.into_values().collect();
    ranking.sort_by(|a, b| b.metric_value(metric).cmp(&a.metric_value(metric)));
    ranking.truncate(top_n);
    Ok(ranking)
}

/// Plays per non-empty bucket, oldest first. Empty for [`Granularity::None`].
pub fn trend(events: &[PlayEvent], granularity: Granularity) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, TrendPoint> = BTreeMap::new();

    for event in events {
        let Some(bucket_start) = granularity.bucket_start(event.played_at()) else {
            continue;
        };
        let point = buckets.entry(bucket_start).or_insert_with(|| TrendPoint {
            bucket_start,
            play_count: 0,
            total_duration_ms: 0,
        });
        point.play_count += 1;
        if let Some(ms) = event.duration_played().as_millis() {
            point.total_duration_ms = point.total_duration_ms.saturating_add(ms);
        }
    }

    buckets.into_values().collect()
}
