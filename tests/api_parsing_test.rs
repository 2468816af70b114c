use spotify_history::api::{check_status, parse_recently_played_response};
use spotify_history::{ingest, AnalyzerConfig, HistoryError, Normalizer, PlayedDuration};
use std::fs;

fn fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{name}")).expect("Could not read test fixture file")
}

#[test]
fn test_recently_played_pages() {
    let first = parse_recently_played_response(&fixture("recently_played_page1.json")).unwrap();
    assert_eq!(first.records.len(), 2);
    assert!(first.has_next_page);
    assert_eq!(first.next_before, Some(1709662610104));

    let last = parse_recently_played_response(&fixture("recently_played_page2.json")).unwrap();
    assert_eq!(last.records.len(), 1);
    assert!(!last.has_next_page);

    // Only the first listed artist is kept
    assert_eq!(last.records[0].get("artist_name"), Some("Taylor Swift"));
}

#[test]
fn test_api_records_normalize_like_uploads() {
    let mut records = parse_recently_played_response(&fixture("recently_played_page1.json"))
        .unwrap()
        .records;
    records.extend(
        parse_recently_played_response(&fixture("recently_played_page2.json"))
            .unwrap()
            .records,
    );

    let normalizer = Normalizer::new(AnalyzerConfig::default().normalizer);
    let report = ingest(records.into_iter().map(Ok), &normalizer).unwrap();

    assert_eq!(report.skipped_count, 0);
    assert_eq!(report.events.len(), 3);

    // Oldest first after ingestion, even though the API returns newest first
    let oldest = &report.events[0];
    assert_eq!(oldest.track_name(), "Snow On The Beach");
    assert_eq!(oldest.source_id(), Some("3hUxzQpSfdDqwM3ZTFQY0K"));
    assert_eq!(oldest.album_name(), Some("Midnights"));
    assert_eq!(oldest.duration_played(), PlayedDuration::Known(291_000));

    let newest = &report.events[2];
    assert_eq!(newest.track_name(), "Anti-Hero");
    assert_eq!(
        newest.played_at().to_rfc3339(),
        "2024-03-05T18:20:11.581+00:00"
    );
}

#[test]
fn test_error_statuses() {
    let expired = r#"{"error": {"status": 401, "message": "The access token expired"}}"#;
    match check_status(401, None, expired) {
        Err(HistoryError::Authentication(msg)) => assert_eq!(msg, "The access token expired"),
        other => panic!("expected an authentication error, got {other:?}"),
    }

    assert!(matches!(
        check_status(429, Some("30"), ""),
        Err(HistoryError::RateLimit { retry_after: 30 })
    ));
    assert!(matches!(
        check_status(429, None, ""),
        Err(HistoryError::RateLimit { retry_after: 60 })
    ));

    let server_error = r#"{"error": {"status": 500, "message": "Server error"}}"#;
    match check_status(500, None, server_error) {
        Err(HistoryError::RemoteService { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Server error");
        }
        other => panic!("expected a remote service error, got {other:?}"),
    }
}
