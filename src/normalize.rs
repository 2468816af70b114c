//! Normalizer: validates one [`RawRecord`] and coerces it into a [`PlayEvent`].
//!
//! Required fields are checked first, then the timestamp. Durations are
//! forgiving: anything that is not a non-negative integer becomes
//! [`PlayedDuration::Unknown`] instead of failing the row.

use crate::config::NormalizerConfig;
use crate::types::{fields, PlayEvent, PlayedDuration, RawRecord};
use crate::{HistoryError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Naive layouts accepted after RFC 3339, interpreted as UTC.
///
/// Spotify's account export writes `endTime` as `2024-01-01 10:00` in UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Converts raw records into canonical play events.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Build a play event from one raw record.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::MissingField`] naming the first of `track_name`,
    ///   `artist_name`, `played_at` that is absent or blank
    /// - [`HistoryError::InvalidTimestamp`] when `played_at` is not a
    ///   recognised timestamp
    pub fn normalize(&self, raw: &RawRecord) -> Result<PlayEvent> {
        let track_name = required(raw, fields::TRACK_NAME)?;
        let artist_name = required(raw, fields::ARTIST_NAME)?;
        let played_at = parse_timestamp(required(raw, fields::PLAYED_AT)?)?;

        let mut event = PlayEvent::new(track_name, artist_name, played_at)
            .with_duration(parse_duration(raw.get(fields::DURATION_MS)))
            .with_reasons(
                raw.non_blank(fields::REASON_START).map(str::to_string),
                raw.non_blank(fields::REASON_END).map(str::to_string),
            );

        if let Some(id) = raw.non_blank(fields::SOURCE_ID).map(canonical_source_id) {
            event = event.with_source_id(id);
        }
        if let Some(album) = raw.non_blank(fields::ALBUM_NAME) {
            event = event.with_album_name(album);
        }
        if let Some(platform) = raw.non_blank(fields::PLATFORM) {
            event = event.with_platform(platform);
        }

        Ok(event)
    }

    /// Whether a well-formed event passes the minimum play length filter.
    pub fn accepts(&self, event: &PlayEvent) -> bool {
        match (self.config.min_duration_ms, event.duration_played()) {
            (Some(min), PlayedDuration::Known(ms)) => ms >= min,
            _ => true,
        }
    }
}

fn required<'r>(raw: &'r RawRecord, field: &str) -> Result<&'r str> {
    raw.non_blank(field).ok_or_else(|| HistoryError::missing(field))
}

/// Parse a played-at value.
///
/// Accepts an integer Unix epoch in milliseconds, RFC 3339, and the naive
/// layouts in [`NAIVE_TIMESTAMP_FORMATS`] (taken as UTC).
///
/// ```rust
/// use spotify_history::normalize::parse_timestamp;
///
/// let a = parse_timestamp("2024-01-01T00:00Z").unwrap();
/// let b = parse_timestamp("1704067200000").unwrap();
/// let c = parse_timestamp("2024-01-01 00:00").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert!(parse_timestamp("last tuesday").is_err());
/// ```
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    let is_integer = {
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    };
    if is_integer {
        return trimmed
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| invalid_timestamp(value));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| invalid_timestamp(value))
}

fn invalid_timestamp(value: &str) -> HistoryError {
    HistoryError::InvalidTimestamp {
        value: value.to_string(),
    }
}

/// Coerce a duration in milliseconds; anything unusable is `Unknown`.
pub fn parse_duration(value: Option<&str>) -> PlayedDuration {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return PlayedDuration::Unknown;
    };

    if let Ok(ms) = trimmed.parse::<u64>() {
        return PlayedDuration::Known(ms);
    }

    // Exports that went through a spreadsheet often carry "1000.0"
    match trimmed.parse::<f64>() {
        Ok(ms) if ms.is_finite() && ms >= 0.0 && ms.fract() == 0.0 && ms <= u64::MAX as f64 => {
            PlayedDuration::Known(ms as u64)
        }
        _ => {
            log::debug!("Treating duration '{trimmed}' as unknown");
            PlayedDuration::Unknown
        }
    }
}

fn track_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:spotify:track:|https?://open\.spotify\.com/(?:[A-Za-z-]+/)?track/)([A-Za-z0-9]+)",
        )
        .expect("track reference pattern is valid")
    })
}

/// Reduce a Spotify track URI or URL to its bare id; other ids pass through.
///
/// ```rust
/// use spotify_history::normalize::canonical_source_id;
///
/// assert_eq!(canonical_source_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC"), "4uLU6hMCjMI75M1A2tKUQC");
/// assert_eq!(
///     canonical_source_id("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=abc"),
///     "4uLU6hMCjMI75M1A2tKUQC"
/// );
/// assert_eq!(canonical_source_id(" custom-42 "), "custom-42");
/// ```
pub fn canonical_source_id(value: &str) -> String {
    let trimmed = value.trim();
    track_reference_pattern()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| trimmed.to_string(), |m| m.as_str().to_string())
}
