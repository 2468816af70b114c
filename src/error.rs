use thiserror::Error;

/// Error types for streaming-history ingestion, aggregation and live fetches.
///
/// The variants fall into three groups:
///
/// - **Fatal to ingestion**: [`Parse`](HistoryError::Parse). The whole upload is
///   rejected and nothing parsed so far is kept.
/// - **Per-row**: [`MissingField`](HistoryError::MissingField) and
///   [`InvalidTimestamp`](HistoryError::InvalidTimestamp). The ingestion
///   pipeline absorbs these, skips the row and counts it; they never escape
///   [`ingest`](crate::pipeline::ingest).
/// - **Call-level**: [`InvalidRequest`](HistoryError::InvalidRequest) from the
///   aggregator, and the adapter boundary errors
///   ([`Authentication`](HistoryError::Authentication),
///   [`RateLimit`](HistoryError::RateLimit),
///   [`RemoteService`](HistoryError::RemoteService), [`Http`](HistoryError::Http)).
///   The adapter never retries; the caller decides.
///
/// # Error Handling Examples
///
/// ```rust,no_run
/// use spotify_history::{AccessToken, HistoryError, SpotifyApiClient, TimeRange};
///
/// #[tokio::main]
/// async fn main() {
///     let client = SpotifyApiClient::new(
///         Box::new(http_client::native::NativeClient::new()),
///         AccessToken::new("token"),
///     );
///
///     match client.fetch_range(TimeRange::unbounded()).await {
///         Ok(records) => println!("Fetched {} plays", records.len()),
///         Err(HistoryError::Authentication(msg)) => eprintln!("Log in again: {}", msg),
///         Err(HistoryError::RateLimit { retry_after }) => {
///             eprintln!("Throttled, try again in {} seconds", retry_after);
///         }
///         Err(e) => eprintln!("Fetch failed: {}", e),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum HistoryError {
    /// The uploaded file could not be parsed at all.
    ///
    /// Raised for an unrecognised format tag, unbalanced or truncated nested
    /// documents, tabular files missing a required column, or rows with the
    /// wrong number of cells.
    #[error("Failed to parse input: {0}")]
    Parse(String),

    /// A required field is absent or blank in one record.
    #[error("Missing required field '{field}'")]
    MissingField {
        /// Canonical name of the missing field
        field: String,
    },

    /// The played-at value of one record is not a recognised timestamp.
    #[error("Invalid timestamp '{value}'")]
    InvalidTimestamp {
        /// The raw value that failed to parse
        value: String,
    },

    /// The aggregation request violates its contract.
    ///
    /// Returned for `top_n <= 0` or an unknown metric, grouping or granularity.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The access token was rejected or has expired.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote service is throttling requests.
    ///
    /// The `retry_after` field carries the server's `Retry-After` hint.
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimit {
        /// Number of seconds to wait before retrying
        retry_after: u64,
    },

    /// Any other non-success response from the remote service.
    #[error("Remote service error (status {status}): {message}")]
    RemoteService {
        /// HTTP status code
        status: u16,
        /// Message reported by the service, or the reason phrase
        message: String,
    },

    /// HTTP/network related errors.
    ///
    /// This includes connection failures, timeouts and malformed URLs.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Whether this error only disqualifies a single row.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            HistoryError::MissingField { .. } | HistoryError::InvalidTimestamp { .. }
        )
    }

    pub(crate) fn missing(field: &str) -> Self {
        HistoryError::MissingField {
            field: field.to_string(),
        }
    }
}

impl From<csv::Error> for HistoryError {
    fn from(e: csv::Error) -> Self {
        HistoryError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_classification() {
        assert!(HistoryError::missing("track_name").is_row_error());
        assert!(HistoryError::InvalidTimestamp {
            value: "yesterday".to_string()
        }
        .is_row_error());
        assert!(!HistoryError::Parse("unbalanced".to_string()).is_row_error());
        assert!(!HistoryError::InvalidRequest("top_n".to_string()).is_row_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            HistoryError::missing("artist_name").to_string(),
            "Missing required field 'artist_name'"
        );
        assert_eq!(
            HistoryError::RateLimit { retry_after: 30 }.to_string(),
            "Rate limited, retry after 30 seconds"
        );
    }
}
