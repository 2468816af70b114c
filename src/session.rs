//! Caller-owned holder for one ingested dataset.
//!
//! A reactive front end re-renders often; keeping a [`Session`] alive across
//! renders avoids re-parsing the upload and recomputing summaries. There is no
//! global state: the session lives exactly as long as its owner keeps it.

use crate::aggregate::{aggregate, AggregateRequest, Summary};
use crate::config::AnalyzerConfig;
use crate::insights::{overview, ListeningOverview};
use crate::normalize::Normalizer;
use crate::parsing::InputFormat;
use crate::pipeline::{ingest, ingest_text, IngestReport};
use crate::types::{PlayEvent, RawRecord};
use crate::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

/// Where a session's events came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// An uploaded file with its declared format
    Upload { name: String, format: InputFormat },
    /// Records fetched from the Web API
    LiveFetch,
    /// Generated demonstration data
    Sample { seed: u64 },
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Upload { name, format } => write!(f, "{name} ({format})"),
            DataSource::LiveFetch => write!(f, "Spotify recently played"),
            DataSource::Sample { seed } => write!(f, "sample data (seed {seed})"),
        }
    }
}

/// One loaded dataset plus memoized summaries.
///
/// # Examples
///
/// ```rust
/// use spotify_history::{AggregateRequest, AnalyzerConfig, InputFormat, Session};
///
/// let csv = "track_name,artist_name,played_at\nA,X,2024-01-01T00:00Z\nA,X,2024-01-02T00:00Z\n";
/// let mut session =
///     Session::from_text("upload.csv", csv, InputFormat::Tabular, &AnalyzerConfig::default()).unwrap();
///
/// let summary = session.summarize(&AggregateRequest::default()).unwrap();
/// assert_eq!(summary.ranking[0].play_count, 2);
/// ```
#[derive(Debug)]
pub struct Session {
    source: DataSource,
    report: IngestReport,
    summaries: HashMap<AggregateRequest, Summary>,
}

impl Session {
    pub fn new(source: DataSource, report: IngestReport) -> Self {
        Self {
            source,
            report,
            summaries: HashMap::new(),
        }
    }

    /// Parse and normalize an upload into a new session.
    pub fn from_text(
        name: &str,
        input: &str,
        format: InputFormat,
        config: &AnalyzerConfig,
    ) -> Result<Self> {
        let report = ingest_text(input, format, config)?;
        Ok(Self::new(
            DataSource::Upload {
                name: name.to_string(),
                format,
            },
            report,
        ))
    }

    /// Normalize already-parsed records (live fetch or sample data).
    pub fn from_records(
        source: DataSource,
        records: Vec<RawRecord>,
        config: &AnalyzerConfig,
    ) -> Result<Self> {
        let normalizer = Normalizer::new(config.normalizer.clone());
        let report = ingest(records.into_iter().map(Ok), &normalizer)?;
        Ok(Self::new(source, report))
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    /// Canonical events, oldest first.
    pub fn events(&self) -> &[PlayEvent] {
        &self.report.events
    }

    /// Aggregate, reusing a previous result for an identical request.
    ///
    /// Invalid requests are rejected every time and never cached.
    pub fn summarize(&mut self, request: &AggregateRequest) -> Result<&Summary> {
        match self.summaries.entry(request.clone()) {
            Entry::Occupied(cached) => {
                log::debug!("Reusing cached summary for {request:?}");
                Ok(cached.into_mut())
            }
            Entry::Vacant(slot) => {
                let summary = aggregate(&self.report.events, request)?;
                Ok(slot.insert(summary))
            }
        }
    }

    pub fn overview(&self) -> ListeningOverview {
        overview(&self.report.events)
    }

    pub fn cached_summaries(&self) -> usize {
        self.summaries.len()
    }
}
