//! Ingestion: drive records through the normalizer and tally what was dropped.

use crate::config::AnalyzerConfig;
use crate::normalize::Normalizer;
use crate::parsing::{parse_records, InputFormat};
use crate::types::{PlayEvent, RawRecord};
use crate::{HistoryError, Result};
use serde::Serialize;

/// Outcome of one ingestion pass.
///
/// `events` is sorted by `played_at` (stable, so equal timestamps keep their
/// input order) and always has
/// `total_rows - skipped_count - filtered_count` entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IngestReport {
    pub events: Vec<PlayEvent>,
    /// Rows read from the source
    pub total_rows: usize,
    /// Rows dropped because a required field was missing or the timestamp was invalid
    pub skipped_count: usize,
    /// Well-formed rows dropped by the minimum play length filter
    pub filtered_count: usize,
    pub missing_field_count: usize,
    pub invalid_timestamp_count: usize,
}

impl IngestReport {
    pub fn has_skipped_rows(&self) -> bool {
        self.skipped_count > 0
    }
}

/// Normalize every record, skipping and counting bad rows.
///
/// A structural error from `records` aborts the pass: the error is returned
/// and everything gathered so far is dropped.
pub fn ingest<I>(records: I, normalizer: &Normalizer) -> Result<IngestReport>
where
    I: IntoIterator<Item = Result<RawRecord>>,
{
    let mut report = IngestReport::default();

    for (index, record) in records.into_iter().enumerate() {
        let record = record?;
        report.total_rows += 1;

        match normalizer.normalize(&record) {
            Ok(event) if normalizer.accepts(&event) => report.events.push(event),
            Ok(event) => {
                log::debug!("Row {}: filtered short play {event}", index + 1);
                report.filtered_count += 1;
            }
            Err(e) => {
                log::debug!("Row {}: skipped ({e})", index + 1);
                report.skipped_count += 1;
                match e {
                    HistoryError::MissingField { .. } => report.missing_field_count += 1,
                    HistoryError::InvalidTimestamp { .. } => report.invalid_timestamp_count += 1,
                    other => return Err(other),
                }
            }
        }
    }

    report.events.sort_by_key(PlayEvent::played_at);

    if report.has_skipped_rows() {
        log::warn!(
            "Ingested {} of {} rows: {} skipped ({} missing a required field, {} with an invalid timestamp), {} filtered",
            report.events.len(),
            report.total_rows,
            report.skipped_count,
            report.missing_field_count,
            report.invalid_timestamp_count,
            report.filtered_count
        );
    } else {
        log::info!(
            "Ingested {} of {} rows ({} filtered)",
            report.events.len(),
            report.total_rows,
            report.filtered_count
        );
    }

    Ok(report)
}

/// Parse and normalize an upload in one pass.
///
/// # Examples
///
/// ```rust
/// use spotify_history::{ingest_text, AnalyzerConfig, InputFormat};
///
/// let csv = "track_name,artist_name,played_at,duration_ms\n\
///            A,X,2024-01-01T00:00Z,1000\n\
///            B,Y,not-a-date,500\n";
/// let report = ingest_text(csv, InputFormat::Tabular, &AnalyzerConfig::default()).unwrap();
///
/// assert_eq!(report.events.len(), 1);
/// assert_eq!(report.skipped_count, 1);
/// ```
pub fn ingest_text(
    input: &str,
    format: InputFormat,
    config: &AnalyzerConfig,
) -> Result<IngestReport> {
    let records = parse_records(input, format, &config.parser)?;
    ingest(records, &Normalizer::new(config.normalizer.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizerConfig;

    fn raw(track: &str, artist: &str, played_at: &str, duration: &str) -> Result<RawRecord> {
        Ok([
            ("track_name", track),
            ("artist_name", artist),
            ("played_at", played_at),
            ("duration_ms", duration),
        ]
        .into_iter()
        .collect())
    }

    #[test]
    fn test_counts_add_up() {
        let records = vec![
            raw("A", "X", "2024-01-02T00:00Z", "1000"),
            raw("", "X", "2024-01-02T00:00Z", "1000"),
            raw("B", "Y", "garbage", "1000"),
            raw("C", "Z", "2024-01-01T00:00Z", "10"),
        ];
        let normalizer = Normalizer::new(NormalizerConfig::default().with_min_duration_ms(100));
        let report = ingest(records, &normalizer).unwrap();

        assert_eq!(report.total_rows, 4);
        assert_eq!(report.skipped_count, 2);
        assert_eq!(report.missing_field_count, 1);
        assert_eq!(report.invalid_timestamp_count, 1);
        assert_eq!(report.filtered_count, 1);
        assert_eq!(
            report.events.len(),
            report.total_rows - report.skipped_count - report.filtered_count
        );
    }

    #[test]
    fn test_events_sorted_by_played_at() {
        let records = vec![
            raw("Late", "X", "2024-03-01T00:00Z", "1"),
            raw("Early", "X", "2024-01-01T00:00Z", "1"),
            raw("Middle", "X", "2024-02-01T00:00Z", "1"),
        ];
        let report = ingest(records, &Normalizer::default()).unwrap();
        let names: Vec<&str> = report.events.iter().map(|e| e.track_name()).collect();
        assert_eq!(names, vec!["Early", "Middle", "Late"]);
    }

    #[test]
    fn test_structural_error_discards_everything() {
        let records = vec![
            raw("A", "X", "2024-01-01T00:00Z", "1"),
            Err(HistoryError::Parse("truncated".to_string())),
            raw("B", "Y", "2024-01-01T00:00Z", "1"),
        ];
        assert!(matches!(
            ingest(records, &Normalizer::default()),
            Err(HistoryError::Parse(_))
        ));
    }
}
