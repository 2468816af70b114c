use super::output::{log_ingest, print_json, print_ranking};
use super::utils::get_access_token;
use super::RankArgs;
use chrono::{DateTime, Utc};
use spotify_history::{
    AggregateRequest, AnalyzerConfig, ClientEvent, DataSource, HistoryError, Session,
    SpotifyApiClient, TimeRange,
};

/// Handle the fetch command
pub async fn handle_fetch(
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    rank: &RankArgs,
    json: bool,
    config: &AnalyzerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let range = TimeRange::new(after, before)?;
    let token = get_access_token(config).await?;

    let http_client = http_client::native::NativeClient::new();
    let client = SpotifyApiClient::with_config(Box::new(http_client), token, config.api.clone());
    let mut events = client.subscribe();

    println!("📡 Fetching recently played tracks...");
    let fetched = client.fetch_range(range).await;

    let mut requests = 0;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::RequestCompleted {
            request,
            status_code,
            duration_ms,
        } = event
        {
            requests += 1;
            log::debug!(
                "{} -> {status_code} in {duration_ms}ms",
                request.short_description()
            );
        }
    }
    log::debug!("Made {requests} API requests");

    let records = match fetched {
        Ok(records) => records,
        Err(HistoryError::RateLimit { retry_after }) => {
            return Err(
                format!("Spotify is rate limiting requests; try again in {retry_after}s").into(),
            );
        }
        Err(HistoryError::Authentication(msg)) => {
            return Err(format!(
                "Spotify rejected the access token ({msg}); refresh it and retry"
            )
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    let mut session = Session::from_records(DataSource::LiveFetch, records, config)?;
    log_ingest(session.report());

    let request = AggregateRequest::new(rank.metric, rank.group_by, rank.top_n);
    let summary = session.summarize(&request)?;
    if json {
        print_json(summary)?;
    } else {
        print_ranking(summary);
    }
    Ok(())
}
