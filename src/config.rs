//! Configuration for parsing, normalization and the live-fetch adapter.
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Files are JSON and are looked up at
//! `$XDG_CONFIG_HOME/spotify-history/config.json` unless a path is given.

use crate::types::fields;
use crate::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

// ================================================================================================
// FIELD MAPPING
// ================================================================================================

/// Table from canonical field names to the source key names that carry them.
///
/// Aliases are matched case-insensitively after trimming. The canonical name
/// itself always matches, ahead of every alias. When a record carries several
/// aliases of one field, the earliest in the list wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, Vec<String>>);

impl Default for FieldMapping {
    fn default() -> Self {
        let table: [(&str, &[&str]); 9] = [
            (
                fields::TRACK_NAME,
                &["master_metadata_track_name", "trackName", "track", "track name", "title"],
            ),
            (
                fields::ARTIST_NAME,
                &["master_metadata_album_artist_name", "artistName", "artist", "artist name"],
            ),
            (
                fields::PLAYED_AT,
                &["ts", "endTime", "playedAt", "played at", "timestamp"],
            ),
            (
                fields::DURATION_MS,
                &["ms_played", "msPlayed", "ms played", "duration"],
            ),
            (
                fields::SOURCE_ID,
                &["spotify_track_uri", "trackUri", "track_uri", "track_id", "uri"],
            ),
            (
                fields::ALBUM_NAME,
                &["master_metadata_album_album_name", "albumName", "album"],
            ),
            (fields::REASON_START, &["reasonStart"]),
            (fields::REASON_END, &["reasonEnd"]),
            (fields::PLATFORM, &[]),
        ];

        Self(
            table
                .into_iter()
                .map(|(canonical, aliases)| {
                    (
                        canonical.to_string(),
                        aliases.iter().map(|a| a.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl FieldMapping {
    /// A mapping with no aliases: only canonical names are recognised.
    pub fn canonical_only() -> Self {
        Self(BTreeMap::new())
    }

    /// Add aliases for a canonical field, keeping any existing ones first.
    pub fn with_aliases(mut self, canonical: &str, aliases: &[&str]) -> Self {
        let entry = self.0.entry(canonical.to_string()).or_default();
        entry.extend(aliases.iter().map(|a| a.to_string()));
        self
    }

    pub fn aliases(&self, canonical: &str) -> &[String] {
        self.0.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Build the lookup used by parsers: lowercased source key → match.
    pub fn resolver(&self) -> FieldResolver {
        let mut lookup = HashMap::new();
        let mut canonicals: Vec<&str> = fields::REQUIRED.to_vec();
        canonicals.extend(self.0.keys().map(String::as_str));

        for canonical in &canonicals {
            lookup
                .entry(canonical.to_lowercase())
                .or_insert_with(|| FieldMatch {
                    canonical: canonical.to_string(),
                    priority: 0,
                });
        }
        for canonical in canonicals {
            for (i, alias) in self.aliases(canonical).iter().enumerate() {
                lookup
                    .entry(alias.trim().to_lowercase())
                    .or_insert_with(|| FieldMatch {
                        canonical: canonical.to_string(),
                        priority: i + 1,
                    });
            }
        }

        FieldResolver { lookup }
    }
}

/// Which canonical field a source key maps to, and how strongly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub canonical: String,
    /// Position in the alias list; 0 is the canonical name itself
    pub priority: usize,
}

/// Case-insensitive source key lookup built from a [`FieldMapping`].
#[derive(Debug, Clone)]
pub struct FieldResolver {
    lookup: HashMap<String, FieldMatch>,
}

impl FieldResolver {
    pub fn resolve(&self, source_key: &str) -> Option<&FieldMatch> {
        self.lookup.get(&source_key.trim().to_lowercase())
    }
}

// ================================================================================================
// COMPONENT CONFIGURATION
// ================================================================================================

/// Configuration for the record parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Delimiter for tabular input (must be ASCII)
    pub delimiter: char,
    /// Source key to canonical field table
    pub field_mapping: FieldMapping,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            field_mapping: FieldMapping::default(),
        }
    }
}

impl ParserConfig {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_field_mapping(mut self, field_mapping: FieldMapping) -> Self {
        self.field_mapping = field_mapping;
        self
    }

    pub(crate) fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                HistoryError::Config(format!(
                    "delimiter {:?} is not a single ASCII character",
                    self.delimiter
                ))
            })
    }
}

/// Configuration for the normalizer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Drop well-formed plays shorter than this many milliseconds.
    ///
    /// Plays with unknown duration are never dropped. `None` keeps everything.
    pub min_duration_ms: Option<u64>,
}

impl NormalizerConfig {
    /// Drop plays shorter than 30 seconds, the threshold Spotify uses for a stream.
    pub fn skip_short_plays() -> Self {
        Self {
            min_duration_ms: Some(30_000),
        }
    }

    pub fn with_min_duration_ms(mut self, min_duration_ms: u64) -> Self {
        self.min_duration_ms = Some(min_duration_ms);
        self
    }
}

/// Configuration for the Spotify Web API adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Web API base URL
    pub base_url: String,
    /// Accounts service URL used for token refresh
    pub accounts_url: String,
    /// Items per recently-played page (1-50)
    pub page_limit: u32,
    /// Stop after this many pages, if set
    pub max_pages: Option<u32>,
    /// Per-request timeout in seconds, if set
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.spotify.com/v1".to_string(),
            accounts_url: "https://accounts.spotify.com".to_string(),
            page_limit: 50,
            max_pages: None,
            timeout_secs: Some(30),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Unified configuration for the whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub parser: ParserConfig,
    pub normalizer: NormalizerConfig,
    pub api: ApiConfig,
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser_config(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_normalizer_config(mut self, normalizer: NormalizerConfig) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_api_config(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Check values serde cannot constrain.
    pub fn validate(&self) -> Result<()> {
        self.parser.delimiter_byte()?;
        if !(1..=50).contains(&self.api.page_limit) {
            return Err(HistoryError::Config(format!(
                "api.page_limit must be between 1 and 50, got {}",
                self.api.page_limit
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HistoryError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Default location: `~/.config/spotify-history/config.json` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("spotify-history").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            HistoryError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&json)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, else the default path if it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_prefers_canonical_then_alias_order() {
        let resolver = FieldMapping::default().resolver();

        let canonical = resolver.resolve("TRACK_NAME").unwrap();
        assert_eq!(canonical.canonical, fields::TRACK_NAME);
        assert_eq!(canonical.priority, 0);

        let extended = resolver.resolve("master_metadata_track_name").unwrap();
        let basic = resolver.resolve("trackName").unwrap();
        assert_eq!(extended.canonical, fields::TRACK_NAME);
        assert!(extended.priority < basic.priority);

        assert_eq!(
            resolver.resolve(" msPlayed ").unwrap().canonical,
            fields::DURATION_MS
        );
        assert!(resolver.resolve("conn_country").is_none());
    }

    #[test]
    fn test_canonical_only_still_resolves_required_fields() {
        let resolver = FieldMapping::canonical_only().resolver();
        assert!(resolver.resolve("played_at").is_some());
        assert!(resolver.resolve("endTime").is_none());
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let config =
            AnalyzerConfig::from_json(r#"{"normalizer": {"min_duration_ms": 30000}}"#).unwrap();
        assert_eq!(config.normalizer, NormalizerConfig::skip_short_plays());
        assert_eq!(config.parser, ParserConfig::default());
        assert_eq!(config.api.page_limit, 50);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            AnalyzerConfig::from_json(r#"{"api": {"page_limit": 0}}"#),
            Err(HistoryError::Config(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_json(r#"{"parser": {"delimiter": "é"}}"#),
            Err(HistoryError::Config(_))
        ));
        assert!(matches!(
            AnalyzerConfig::from_json("not json"),
            Err(HistoryError::Config(_))
        ));
    }
}
