//! Core data types shared by the parser, normalizer, aggregator and API adapter.
//!
//! [`RawRecord`] is the loosely-typed, source-shaped mapping that parsers and the
//! live-fetch adapter produce. [`PlayEvent`] is the strict canonical record the
//! [`Normalizer`](crate::normalize::Normalizer) builds from it; nothing downstream
//! of the normalizer looks at raw records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical keys used in [`RawRecord`]s.
///
/// Parsers translate source column/key names into these through the
/// configured [`FieldMapping`](crate::config::FieldMapping).
pub mod fields {
    pub const TRACK_NAME: &str = "track_name";
    pub const ARTIST_NAME: &str = "artist_name";
    pub const PLAYED_AT: &str = "played_at";
    pub const DURATION_MS: &str = "duration_ms";
    pub const SOURCE_ID: &str = "source_id";
    pub const ALBUM_NAME: &str = "album_name";
    pub const REASON_START: &str = "reason_start";
    pub const REASON_END: &str = "reason_end";
    pub const PLATFORM: &str = "platform";

    /// Fields without which a row cannot become a play event, in check order.
    pub const REQUIRED: [&str; 3] = [TRACK_NAME, ARTIST_NAME, PLAYED_AT];
}

// ================================================================================================
// RAW RECORDS
// ================================================================================================

/// A string-keyed, string-valued record as read from an export or the API.
///
/// Backed by an ordered map so that iteration and serialization are
/// deterministic.
///
/// # Examples
///
/// ```rust
/// use spotify_history::RawRecord;
///
/// let record: RawRecord = [("track_name", "Song A"), ("artist_name", "Artist X")]
///     .into_iter()
///     .collect();
/// assert_eq!(record.get("track_name"), Some("Song A"));
/// assert_eq!(record.get("played_at"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, String>);

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert a value only if the key is not present yet.
    ///
    /// Returns `true` when the value was stored.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The trimmed value for `key`, or `None` when absent or blank.
    pub fn non_blank(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ================================================================================================
// PLAY EVENTS
// ================================================================================================

/// How long a play lasted, when the source says so.
///
/// `Known(0)` and `Unknown` are distinct: the first is a real zero-length play
/// that still contributes to duration totals, the second is excluded from them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayedDuration {
    /// Milliseconds played
    Known(u64),
    #[default]
    Unknown,
}

impl PlayedDuration {
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            PlayedDuration::Known(ms) => Some(*ms),
            PlayedDuration::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, PlayedDuration::Known(_))
    }
}

impl From<Option<u64>> for PlayedDuration {
    fn from(ms: Option<u64>) -> Self {
        ms.map_or(PlayedDuration::Unknown, PlayedDuration::Known)
    }
}

/// One listening occurrence, validated and strictly typed.
///
/// Events are immutable once built: the `with_*` methods consume the event
/// during construction and there are no setters.
///
/// # Examples
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use spotify_history::{PlayEvent, PlayedDuration};
///
/// let event = PlayEvent::new("Paranoid Android", "Radiohead", Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
///     .with_duration(PlayedDuration::Known(383_000))
///     .with_source_id("6LgJvl0Xdtc73RJ1mmpotq");
///
/// assert_eq!(event.duration_played().as_millis(), Some(383_000));
/// println!("{event}");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayEvent {
    track_name: String,
    artist_name: String,
    played_at: DateTime<Utc>,
    duration_played: PlayedDuration,
    source_id: Option<String>,
    album_name: Option<String>,
    reason_start: Option<String>,
    reason_end: Option<String>,
    platform: Option<String>,
}

impl PlayEvent {
    pub fn new(
        track_name: impl Into<String>,
        artist_name: impl Into<String>,
        played_at: DateTime<Utc>,
    ) -> Self {
        Self {
            track_name: track_name.into(),
            artist_name: artist_name.into(),
            played_at,
            duration_played: PlayedDuration::Unknown,
            source_id: None,
            album_name: None,
            reason_start: None,
            reason_end: None,
            platform: None,
        }
    }

    pub fn with_duration(mut self, duration: PlayedDuration) -> Self {
        self.duration_played = duration;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_album_name(mut self, album_name: impl Into<String>) -> Self {
        self.album_name = Some(album_name.into());
        self
    }

    pub fn with_reasons(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.reason_start = start;
        self.reason_end = end;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn track_name(&self) -> &str {
        &self.track_name
    }

    pub fn artist_name(&self) -> &str {
        &self.artist_name
    }

    pub fn played_at(&self) -> DateTime<Utc> {
        self.played_at
    }

    pub fn duration_played(&self) -> PlayedDuration {
        self.duration_played
    }

    /// Stable external identifier (Spotify track id), if the source had one.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn album_name(&self) -> Option<&str> {
        self.album_name.as_deref()
    }

    pub fn reason_start(&self) -> Option<&str> {
        self.reason_start.as_deref()
    }

    /// Why playback ended (`trackdone`, `fwdbtn`, `logout`, ...).
    pub fn reason_end(&self) -> Option<&str> {
        self.reason_end.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }
}

impl fmt::Display for PlayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} @ {}",
            self.artist_name,
            self.track_name,
            self.played_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}
