pub mod aggregate;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod insights;
pub mod iterator;
pub mod normalize;
pub mod parsing;
pub mod pipeline;
pub mod sample;
pub mod session;
pub mod types;

pub use aggregate::{
    aggregate, AggregateRequest, Granularity, GroupBy, Metric, RankedEntry, Summary, TrendPoint,
};
pub use api::{RecentlyPlayedApi, RecentlyPlayedPage, SpotifyApiClient, TimeRange};
pub use auth::{refresh_access_token, AccessToken, RefreshCredentials};
pub use config::{AnalyzerConfig, ApiConfig, FieldMapping, NormalizerConfig, ParserConfig};
pub use error::HistoryError;
pub use events::{ClientEvent, ClientEventReceiver, RequestInfo, SharedEventBroadcaster};
pub use insights::{CompletionBreakdown, ListeningOverview};
pub use iterator::{into_stream, AsyncPaginatedIterator, RecentlyPlayedIterator};
pub use normalize::Normalizer;
pub use parsing::{parse_records, InputFormat};
pub use pipeline::{ingest, ingest_text, IngestReport};
pub use session::{DataSource, Session};
pub use types::{PlayEvent, PlayedDuration, RawRecord};

#[cfg(feature = "mock")]
pub use api::MockRecentlyPlayedApi;
#[cfg(feature = "mock")]
pub use iterator::MockAsyncPaginatedIterator;

pub type Result<T> = std::result::Result<T, HistoryError>;
