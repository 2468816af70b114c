//! Record parser: turns an uploaded export into a lazy sequence of [`RawRecord`]s.
//!
//! Two shapes are understood:
//!
//! - **Tabular**: delimited text with a header row. Header names are resolved
//!   through the configured [`FieldMapping`](crate::config::FieldMapping); the
//!   track, artist and played-at columns must all be present.
//! - **Nested**: a JSON array of objects (the shape of Spotify's
//!   `StreamingHistory*.json` / `Streaming_History_Audio_*.json` files) or a
//!   sequence of concatenated / newline-delimited objects.
//!
//! Both iterators are fused: the first structural error is yielded once and
//! iteration stops. Callers are expected to abandon the whole parse at that
//! point.

use crate::config::{FieldResolver, ParserConfig};
use crate::types::{fields, RawRecord};
use crate::{HistoryError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Boxed lazy record sequence returned by [`parse_records`].
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<RawRecord>> + 'a>;

/// Declared format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputFormat {
    /// Delimited text with a header row
    Tabular,
    /// JSON objects
    Nested,
}

impl InputFormat {
    /// Guess the format from a file extension (`csv`, `tsv`, `json`, `jsonl`).
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "tsv" | "txt" => Some(InputFormat::Tabular),
            "json" | "jsonl" | "ndjson" => Some(InputFormat::Nested),
            _ => None,
        }
    }
}

impl FromStr for InputFormat {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tabular" | "csv" => Ok(InputFormat::Tabular),
            "nested" | "json" => Ok(InputFormat::Nested),
            other => Err(HistoryError::Parse(format!(
                "Unrecognized input format '{other}' (expected 'tabular' or 'nested')"
            ))),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Tabular => write!(f, "tabular"),
            InputFormat::Nested => write!(f, "nested"),
        }
    }
}

/// Parse `input` lazily.
///
/// Fails immediately for problems detectable up front (bad delimiter, missing
/// required columns); later structural problems surface as an `Err` item.
///
/// # Examples
///
/// ```rust
/// use spotify_history::config::ParserConfig;
/// use spotify_history::parsing::{parse_records, InputFormat};
///
/// let csv = "trackName,artistName,endTime,msPlayed\nSong A,Artist X,2024-01-01 10:00,1000\n";
/// let records: Vec<_> = parse_records(csv, InputFormat::Tabular, &ParserConfig::default())
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
///
/// assert_eq!(records[0].get("track_name"), Some("Song A"));
/// assert_eq!(records[0].get("duration_ms"), Some("1000"));
/// ```
pub fn parse_records<'a>(
    input: &'a str,
    format: InputFormat,
    config: &ParserConfig,
) -> Result<RecordIter<'a>> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    log::debug!("Parsing {} bytes of {format} input", input.len());

    match format {
        InputFormat::Tabular => Ok(Box::new(TabularRecords::new(input, config)?)),
        InputFormat::Nested => Ok(Box::new(NestedRecords::new(
            input,
            config.field_mapping.resolver(),
        ))),
    }
}

/// Decide the output key for every source key.
///
/// The highest-priority source key for each canonical field is renamed to the
/// canonical name; everything else, including losing aliases, keeps its
/// original name.
fn output_keys<'k>(resolver: &FieldResolver, source_keys: &[&'k str]) -> Vec<String> {
    let mut winners: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, key) in source_keys.iter().enumerate() {
        if let Some(m) = resolver.resolve(key) {
            let slot = winners
                .entry(m.canonical.as_str())
                .or_insert((m.priority, index));
            if m.priority < slot.0 {
                *slot = (m.priority, index);
            }
        }
    }

    source_keys
        .iter()
        .enumerate()
        .map(|(index, key)| match resolver.resolve(key) {
            Some(m) if winners.get(m.canonical.as_str()).map(|w| w.1) == Some(index) => {
                m.canonical.clone()
            }
            _ => key.to_string(),
        })
        .collect()
}

// ================================================================================================
// TABULAR
// ================================================================================================

/// Lazy iterator over the rows of a delimited file.
pub struct TabularRecords<'a> {
    rows: csv::StringRecordsIntoIter<&'a [u8]>,
    keys: Vec<String>,
    line: u64,
    finished: bool,
}

impl<'a> TabularRecords<'a> {
    pub fn new(input: &'a str, config: &ParserConfig) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter_byte()?)
            .trim(csv::Trim::All)
            .has_headers(true)
            .from_reader(input.as_bytes());

        let headers = reader.headers()?.clone();
        let header_names: Vec<&str> = headers.iter().collect();
        let keys = output_keys(&config.field_mapping.resolver(), &header_names);

        let missing: Vec<&str> = fields::REQUIRED
            .iter()
            .copied()
            .filter(|required| !keys.iter().any(|k| k == required))
            .collect();
        if !missing.is_empty() {
            return Err(HistoryError::Parse(format!(
                "Missing required column(s): {} (found headers: {})",
                missing.join(", "),
                header_names.join(", ")
            )));
        }

        log::debug!("Tabular columns resolved to: {}", keys.join(", "));

        Ok(Self {
            rows: reader.into_records(),
            keys,
            line: 1,
            finished: false,
        })
    }
}

impl Iterator for TabularRecords<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.rows.next() {
            Some(Ok(row)) => {
                self.line += 1;
                let record = self
                    .keys
                    .iter()
                    .zip(row.iter())
                    .filter(|(_, cell)| !cell.is_empty())
                    .map(|(key, cell)| (key.as_str(), cell))
                    .collect();
                Some(Ok(record))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(HistoryError::Parse(format!(
                    "Malformed row after line {}: {e}",
                    self.line
                ))))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

// ================================================================================================
// NESTED
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NestedState {
    Start,
    /// Inside a top-level array; `first` until one element has been read
    Array { first: bool },
    /// Concatenated or newline-delimited objects
    Objects,
    Finished,
}

/// Lazy iterator over the objects of a nested document.
///
/// Only one element is deserialized at a time; the separators between array
/// elements are scanned by hand so the document is never materialised as a
/// whole.
pub struct NestedRecords<'a> {
    input: &'a str,
    offset: usize,
    state: NestedState,
    resolver: FieldResolver,
    records_read: usize,
}

impl<'a> NestedRecords<'a> {
    pub fn new(input: &'a str, resolver: FieldResolver) -> Self {
        Self {
            input,
            offset: 0,
            state: NestedState::Start,
            resolver,
            records_read: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input.as_bytes()[self.offset..];
        let skipped = rest
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
            .count();
        self.offset += skipped;
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.offset).copied()
    }

    fn fail(&mut self, message: String) -> Option<Result<RawRecord>> {
        self.state = NestedState::Finished;
        Some(Err(HistoryError::Parse(message)))
    }

    fn read_object(&mut self) -> Option<Result<RawRecord>> {
        let mut stream =
            serde_json::Deserializer::from_str(&self.input[self.offset..]).into_iter::<Value>();
        let element = self.records_read + 1;

        match stream.next() {
            Some(Ok(Value::Object(map))) => {
                self.offset += stream.byte_offset();
                self.records_read += 1;

                let pairs: Vec<(String, String)> = map
                    .into_iter()
                    .filter_map(|(key, value)| stringify(value).map(|v| (key, v)))
                    .collect();
                let source_keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                let keys = output_keys(&self.resolver, &source_keys);
                let record = keys
                    .into_iter()
                    .zip(pairs.into_iter().map(|(_, v)| v))
                    .collect();
                Some(Ok(record))
            }
            Some(Ok(other)) => self.fail(format!(
                "Element {element} is not an object (found {})",
                json_kind(&other)
            )),
            Some(Err(e)) => self.fail(format!("Element {element}: {e}")),
            None => self.fail("Unexpected end of input".to_string()),
        }
    }
}

impl Iterator for NestedRecords<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                NestedState::Finished => return None,
                NestedState::Start => {
                    self.skip_whitespace();
                    match self.peek() {
                        None => return self.fail("Empty document".to_string()),
                        Some(b'[') => {
                            self.offset += 1;
                            self.state = NestedState::Array { first: true };
                        }
                        Some(b'{') => self.state = NestedState::Objects,
                        Some(other) => {
                            return self.fail(format!(
                                "Expected '[' or '{{' at start of document, found '{}'",
                                other as char
                            ))
                        }
                    }
                }
                NestedState::Array { first } => {
                    self.skip_whitespace();
                    match self.peek() {
                        None => return self.fail("Unterminated array: missing ']'".to_string()),
                        Some(b']') => {
                            self.offset += 1;
                            self.skip_whitespace();
                            if self.offset < self.input.len() {
                                return self
                                    .fail("Trailing characters after closing ']'".to_string());
                            }
                            self.state = NestedState::Finished;
                            return None;
                        }
                        Some(b',') if !first => {
                            self.offset += 1;
                            self.skip_whitespace();
                        }
                        Some(other) if !first => {
                            return self.fail(format!(
                                "Expected ',' or ']' after element {}, found '{}'",
                                self.records_read, other as char
                            ))
                        }
                        Some(_) => {}
                    }
                    self.state = NestedState::Array { first: false };
                    return self.read_object();
                }
                NestedState::Objects => {
                    self.skip_whitespace();
                    if self.peek().is_none() {
                        self.state = NestedState::Finished;
                        return None;
                    }
                    return self.read_object();
                }
            }
        }
    }
}

/// Flatten a JSON value into a raw string; `null` means absent.
fn stringify(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str, format: InputFormat) -> Result<Vec<RawRecord>> {
        parse_records(input, format, &ParserConfig::default())?.collect()
    }

    #[test]
    fn test_format_tags() {
        assert_eq!("csv".parse::<InputFormat>().unwrap(), InputFormat::Tabular);
        assert_eq!("Nested".parse::<InputFormat>().unwrap(), InputFormat::Nested);
        assert!(matches!(
            "xml".parse::<InputFormat>(),
            Err(HistoryError::Parse(_))
        ));
        assert_eq!(InputFormat::from_extension("JSON"), Some(InputFormat::Nested));
        assert_eq!(InputFormat::from_extension("parquet"), None);
    }

    #[test]
    fn test_tabular_maps_headers_and_passes_extras_through() {
        let csv = "Track Name,Artist Name,Played At,ms_played,conn_country\n\
                   Song A,Artist X,2024-01-01T00:00Z,1000,DE\n";
        let records = collect(csv, InputFormat::Tabular).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(fields::TRACK_NAME), Some("Song A"));
        assert_eq!(records[0].get(fields::PLAYED_AT), Some("2024-01-01T00:00Z"));
        assert_eq!(records[0].get(fields::DURATION_MS), Some("1000"));
        assert_eq!(records[0].get("conn_country"), Some("DE"));
    }

    #[test]
    fn test_tabular_missing_required_column() {
        let csv = "trackName,msPlayed\nSong A,1000\n";
        let err = match parse_records(csv, InputFormat::Tabular, &ParserConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("expected missing column error"),
        };
        let message = err.to_string();
        assert!(message.contains("artist_name"), "{message}");
        assert!(message.contains("played_at"), "{message}");
    }

    #[test]
    fn test_tabular_empty_cells_are_absent() {
        let csv = "track_name,artist_name,played_at,duration_ms\nSong A,Artist X,2024-01-01T00:00Z,\n";
        let records = collect(csv, InputFormat::Tabular).unwrap();
        assert!(!records[0].contains_key(fields::DURATION_MS));
    }

    #[test]
    fn test_tabular_ragged_row_is_structural_error() {
        let csv = "track_name,artist_name,played_at\nA,X,2024-01-01T00:00Z\nB,Y\n";
        let mut iter = parse_records(csv, InputFormat::Tabular, &ParserConfig::default()).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(matches!(iter.next(), Some(Err(HistoryError::Parse(_)))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_tabular_custom_delimiter() {
        let tsv = "track_name\tartist_name\tplayed_at\nA\tX\t2024-01-01T00:00Z\n";
        let config = ParserConfig::default().with_delimiter('\t');
        let records: Vec<_> = parse_records(tsv, InputFormat::Tabular, &config)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records[0].get(fields::ARTIST_NAME), Some("X"));
    }

    #[test]
    fn test_nested_array_of_export_objects() {
        let json = r#"[
            {"endTime": "2024-01-01 10:00", "artistName": "Artist X", "trackName": "Song A", "msPlayed": 1000},
            {"endTime": "2024-01-02 11:00", "artistName": "Artist Y", "trackName": "Song B", "msPlayed": 2000}
        ]"#;
        let records = collect(json, InputFormat::Nested).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get(fields::TRACK_NAME), Some("Song B"));
        assert_eq!(records[1].get(fields::DURATION_MS), Some("2000"));
    }

    #[test]
    fn test_nested_nulls_are_absent_and_best_alias_wins() {
        let json = r#"[{
            "ts": "2024-01-01T10:00:00Z",
            "endTime": "1999-01-01 00:00",
            "master_metadata_track_name": null,
            "master_metadata_album_artist_name": "Artist X",
            "episode_name": "Some Episode",
            "skipped": false
        }]"#;
        let records = collect(json, InputFormat::Nested).unwrap();
        let record = &records[0];
        assert_eq!(record.get(fields::PLAYED_AT), Some("2024-01-01T10:00:00Z"));
        assert_eq!(record.get("endTime"), Some("1999-01-01 00:00"));
        assert!(!record.contains_key(fields::TRACK_NAME));
        assert_eq!(record.get("skipped"), Some("false"));
    }

    #[test]
    fn test_nested_json_lines() {
        let json = "{\"track_name\":\"A\",\"artist_name\":\"X\",\"played_at\":\"1704067200000\"}\n\
                    {\"track_name\":\"B\",\"artist_name\":\"Y\",\"played_at\":\"1704153600000\"}\n";
        let records = collect(json, InputFormat::Nested).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_nested_empty_array() {
        assert!(collect("  [ ]  ", InputFormat::Nested).unwrap().is_empty());
    }

    #[test]
    fn test_nested_structural_errors() {
        for bad in [
            "",
            "[{\"track_name\": \"A\"}",
            "[{\"track_name\": \"A\"} {\"track_name\": \"B\"}]",
            "[{\"track_name\": \"A\"}] trailing",
            "[1, 2]",
            "\"just a string\"",
            "[{\"track_name\": ",
        ] {
            let result = collect(bad, InputFormat::Nested);
            assert!(
                matches!(result, Err(HistoryError::Parse(_))),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_nested_iterator_is_fused_after_error() {
        let json = "[{\"track_name\": \"A\"}, oops, {\"track_name\": \"B\"}]";
        let mut iter = parse_records(json, InputFormat::Nested, &ParserConfig::default()).unwrap();
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
