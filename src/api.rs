use crate::auth::AccessToken;
use crate::config::ApiConfig;
use crate::events::{ClientEvent, ClientEventReceiver, RequestInfo, SharedEventBroadcaster};
use crate::headers::add_api_headers;
use crate::iterator::{AsyncPaginatedIterator, RecentlyPlayedIterator};
use crate::types::{fields, RawRecord};
use crate::{HistoryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http_client::{HttpClient, Request, Response};
use http_types::{Method, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Seconds to wait when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// =============================================================================
// RecentlyPlayedApi trait and implementation
// =============================================================================

/// One page of the recently-played endpoint, newest item first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecentlyPlayedPage {
    pub records: Vec<RawRecord>,
    /// Cursor (Unix ms) for the next, older page
    pub next_before: Option<i64>,
    pub has_next_page: bool,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait(?Send)]
pub trait RecentlyPlayedApi {
    /// Fetch the page of plays strictly before `before` (Unix ms), or the
    /// most recent page when `None`.
    async fn recently_played_page(&self, before: Option<i64>) -> Result<RecentlyPlayedPage>;
}

/// Half-open window `[start, end)` of played-at instants. Either bound may be
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if start >= end {
                return Err(HistoryError::InvalidRequest(format!(
                    "time range start {start} is not before end {end}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }

    /// True when `at` lies before the window, so nothing older can match.
    pub fn is_before_start(&self, at: DateTime<Utc>) -> bool {
        self.start.is_some_and(|start| at < start)
    }
}

/// Web API client for a user's recently-played history.
///
/// Cloning is cheap; clones share the HTTP client and the event broadcaster.
#[derive(Clone)]
pub struct SpotifyApiClient {
    client: Arc<dyn HttpClient + Send + Sync>,
    token: AccessToken,
    config: ApiConfig,
    broadcaster: Arc<SharedEventBroadcaster>,
}

impl SpotifyApiClient {
    pub fn new(client: Box<dyn HttpClient + Send + Sync>, token: AccessToken) -> Self {
        Self::with_config(client, token, ApiConfig::default())
    }

    pub fn with_config(
        client: Box<dyn HttpClient + Send + Sync>,
        token: AccessToken,
        config: ApiConfig,
    ) -> Self {
        Self {
            client: Arc::from(client),
            token,
            config,
            broadcaster: Arc::new(SharedEventBroadcaster::new()),
        }
    }

    pub fn subscribe(&self) -> ClientEventReceiver {
        self.broadcaster.subscribe()
    }

    pub fn latest_event(&self) -> Option<ClientEvent> {
        self.broadcaster.latest_event()
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Iterate over the plays inside `range`, newest first.
    pub fn recently_played(&self, range: TimeRange) -> RecentlyPlayedIterator<Self> {
        RecentlyPlayedIterator::new(self.clone(), range).with_max_pages(self.config.max_pages)
    }

    /// Fetch every play inside `range` as raw records ready for normalization.
    pub async fn fetch_range(&self, range: TimeRange) -> Result<Vec<RawRecord>> {
        let records = self.recently_played(range).collect_all().await?;
        log::info!("Fetched {} recently played records", records.len());
        Ok(records)
    }
}

/// URL of one recently-played page.
pub fn recently_played_url(config: &ApiConfig, before: Option<i64>) -> String {
    let mut url = format!(
        "{}/me/player/recently-played?limit={}",
        config.base_url.trim_end_matches('/'),
        config.page_limit
    );
    if let Some(before) = before {
        url.push_str(&format!("&before={before}"));
    }
    url
}

#[async_trait(?Send)]
impl RecentlyPlayedApi for SpotifyApiClient {
    async fn recently_played_page(&self, before: Option<i64>) -> Result<RecentlyPlayedPage> {
        if self.token.is_expired(Utc::now()) {
            return Err(HistoryError::Authentication(
                "access token has expired".to_string(),
            ));
        }

        let url = recently_played_url(&self.config, before);
        let parsed = url
            .parse::<Url>()
            .map_err(|e| HistoryError::Config(format!("Invalid API URL '{url}': {e}")))?;

        let request_info = RequestInfo::from_url("GET", &parsed);
        let request_start = std::time::Instant::now();
        log::debug!("{}", request_info.short_description());

        self.broadcaster
            .broadcast_event(ClientEvent::RequestStarted {
                request: request_info.clone(),
            });

        let mut request = Request::new(Method::Get, parsed);
        add_api_headers(&mut request, &self.token);
        let mut response =
            send_with_timeout(&*self.client, request, self.config.timeout_secs).await?;
        let status: u16 = response.status().into();

        self.broadcaster
            .broadcast_event(ClientEvent::RequestCompleted {
                request: request_info.clone(),
                status_code: status,
                duration_ms: request_start.elapsed().as_millis() as u64,
            });

        let retry_after = response
            .header("retry-after")
            .and_then(|h| h.get(0))
            .map(|v| v.as_str().to_string());
        let body = response
            .body_string()
            .await
            .map_err(|e| HistoryError::Http(e.to_string()))?;

        if let Err(err) = check_status(status, retry_after.as_deref(), &body) {
            if let HistoryError::RateLimit { retry_after } = &err {
                log::warn!("Rate limited by the Web API, retry after {retry_after}s");
                self.broadcaster.broadcast_event(ClientEvent::RateLimited {
                    retry_after: *retry_after,
                    request: request_info,
                });
            }
            return Err(err);
        }

        parse_recently_played_response(&body)
    }
}

/// Send a request, failing with [`HistoryError::Http`] after `timeout_secs`.
pub(crate) async fn send_with_timeout(
    client: &dyn HttpClient,
    request: Request,
    timeout_secs: Option<u64>,
) -> Result<Response> {
    let sent = match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), client.send(request))
            .await
            .map_err(|_| HistoryError::Http(format!("Request timed out after {secs}s")))?,
        None => client.send(request).await,
    };
    sent.map_err(|e| HistoryError::Http(e.to_string()))
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Deserialize)]
pub struct ApiRecentlyPlayedResponse {
    pub items: Vec<ApiPlayHistoryItem>,
    pub next: Option<String>,
    pub cursors: Option<ApiCursors>,
}

#[derive(Deserialize)]
pub struct ApiPlayHistoryItem {
    pub track: ApiTrack,
    pub played_at: String,
}

#[derive(Deserialize)]
pub struct ApiTrack {
    pub id: Option<String>,
    pub name: String,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    pub album: Option<ApiAlbum>,
}

#[derive(Deserialize)]
pub struct ApiArtist {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ApiAlbum {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ApiCursors {
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a response status to the adapter's error taxonomy.
///
/// 401 and 403 are authentication failures, 429 carries the `Retry-After`
/// hint, and every other non-2xx becomes a remote service error with the
/// message from the body's `{"error": {"message": ...}}` when present.
pub fn check_status(status: u16, retry_after: Option<&str>, body: &str) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .ok();

    match status {
        401 | 403 => Err(HistoryError::Authentication(
            message.unwrap_or_else(|| format!("HTTP {status}")),
        )),
        429 => Err(HistoryError::RateLimit {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        }),
        _ => Err(HistoryError::RemoteService {
            status,
            message: message.unwrap_or_else(|| format!("HTTP {status}")),
        }),
    }
}

pub fn parse_recently_played_response(json: &str) -> Result<RecentlyPlayedPage> {
    let response: ApiRecentlyPlayedResponse = serde_json::from_str(json)
        .map_err(|e| HistoryError::Parse(format!("Malformed recently-played response: {e}")))?;

    let next_before = response
        .cursors
        .as_ref()
        .and_then(|c| c.before.as_deref())
        .and_then(|b| b.parse::<i64>().ok());
    let has_next_page = response.next.is_some() && next_before.is_some();

    Ok(RecentlyPlayedPage {
        records: response.items.into_iter().map(item_to_record).collect(),
        next_before,
        has_next_page,
    })
}

/// Map one play to the same record shape the file parser produces.
///
/// A track with no artists yields a record without `artist_name`, which the
/// normalizer then counts as a missing field.
pub fn item_to_record(item: ApiPlayHistoryItem) -> RawRecord {
    let mut record = RawRecord::new();
    record.insert(fields::TRACK_NAME, item.track.name);
    if let Some(artist) = item.track.artists.into_iter().next() {
        record.insert(fields::ARTIST_NAME, artist.name);
    }
    record.insert(fields::PLAYED_AT, item.played_at);
    if let Some(duration) = item.track.duration_ms {
        record.insert(fields::DURATION_MS, duration.to_string());
    }
    if let Some(id) = item.track.id {
        record.insert(fields::SOURCE_ID, id);
    }
    if let Some(album) = item.track.album {
        record.insert(fields::ALBUM_NAME, album.name);
    }
    record
}
