use chrono::{TimeZone, Utc};
use spotify_history::insights::{completion_breakdown, DEFAULT_COMPLETION_THRESHOLD_MS};
use spotify_history::{
    parse_records, sample, AggregateRequest, AnalyzerConfig, DataSource, Granularity, GroupBy,
    InputFormat, Metric, ParserConfig, Session,
};
use std::fs;

fn export_session() -> Session {
    let json = fs::read_to_string("tests/fixtures/StreamingHistory0.json")
        .expect("Could not read test fixture file");
    Session::from_text(
        "StreamingHistory0.json",
        &json,
        InputFormat::Nested,
        &AnalyzerConfig::default(),
    )
    .unwrap()
}

#[test_log::test]
fn test_session_overview() {
    let session = export_session();
    let overview = session.overview();

    assert_eq!(overview.total_plays, 6);
    assert_eq!(overview.unique_tracks, 4);
    assert_eq!(overview.unique_artists, 3);
    assert_eq!(overview.active_days, 4);
    assert_eq!(overview.top_artist, Some(("Taylor Swift".to_string(), 3)));
    assert_eq!(overview.most_active_hour, Some(8));

    let completion = completion_breakdown(session.events(), DEFAULT_COMPLETION_THRESHOLD_MS);
    assert_eq!(completion.completed, 4);
    assert_eq!(completion.skipped, 2);
}

#[test_log::test]
fn test_session_caches_each_request_once() {
    let mut session = export_session();
    let tracks = AggregateRequest::new(Metric::Plays, GroupBy::Track, 3);
    let monthly = AggregateRequest::new(Metric::Duration, GroupBy::Artist, 3)
        .with_trend(Granularity::Month);

    let top_track = session.summarize(&tracks).unwrap().ranking[0].clone();
    assert_eq!(top_track.entity_name, "Anti-Hero");
    assert_eq!(top_track.play_count, 2);

    let trend = session.summarize(&monthly).unwrap().trend.clone().unwrap();
    assert_eq!(trend.len(), 2);

    session.summarize(&tracks).unwrap();
    assert_eq!(session.cached_summaries(), 2);
}

#[test_log::test]
fn test_sample_data_is_reproducible() {
    let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let first = sample::generate_json(250, 99, end).unwrap();
    let second = sample::generate_json(250, 99, end).unwrap();
    assert_eq!(first, second);

    let records = parse_records(&first, InputFormat::Nested, &ParserConfig::default())
        .unwrap()
        .collect::<spotify_history::Result<Vec<_>>>()
        .unwrap();
    let mut session = Session::from_records(
        DataSource::Sample { seed: 99 },
        records,
        &AnalyzerConfig::default(),
    )
    .unwrap();

    assert_eq!(session.events().len(), 250);
    assert_eq!(session.source().to_string(), "sample data (seed 99)");

    let artists = session
        .summarize(&AggregateRequest::new(Metric::Plays, GroupBy::Artist, 10))
        .unwrap();
    let total: usize = artists.ranking.iter().map(|e| e.play_count).sum();
    assert_eq!(total, 250);
}

#[test_log::test]
fn test_config_file_round_trip() {
    let path = std::env::temp_dir().join(format!(
        "spotify-history-config-{}.json",
        std::process::id()
    ));
    fs::write(
        &path,
        r#"{"parser": {"delimiter": ";"}, "normalizer": {"min_duration_ms": 30000}, "api": {"page_limit": 20}}"#,
    )
    .unwrap();

    let config = AnalyzerConfig::load_or_default(Some(&path)).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(config.parser.delimiter, ';');
    assert_eq!(config.normalizer.min_duration_ms, Some(30_000));
    assert_eq!(config.api.page_limit, 20);
    assert_eq!(config.api.base_url, "https://api.spotify.com/v1");

    let csv = "track_name;artist_name;played_at;duration_ms\nA;X;2024-01-01T00:00Z;1000\n";
    let session = Session::from_text("semi.csv", csv, InputFormat::Tabular, &config).unwrap();
    assert_eq!(session.report().filtered_count, 1);
    assert!(session.events().is_empty());
}
