#[cfg(feature = "mock")]
mod mock_tests {
    use chrono::{TimeZone, Utc};
    use mockall::predicate::*; // for eq(), any(), etc.
    use spotify_history::api::parse_recently_played_response;
    use spotify_history::{
        AggregateRequest, AnalyzerConfig, AsyncPaginatedIterator, DataSource, GroupBy,
        HistoryError, Metric, MockRecentlyPlayedApi, RecentlyPlayedIterator, RecentlyPlayedPage,
        Result, Session, TimeRange,
    };
    use std::fs;

    fn fixture_page(name: &str) -> RecentlyPlayedPage {
        let json = fs::read_to_string(format!("tests/fixtures/{name}"))
            .expect("Could not read test fixture file");
        parse_recently_played_response(&json).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_mock_pages_feed_a_session() -> Result<()> {
        let mut mock_api = MockRecentlyPlayedApi::new();

        mock_api
            .expect_recently_played_page()
            .with(eq(None))
            .times(1)
            .returning(|_| Ok(fixture_page("recently_played_page1.json")));

        mock_api
            .expect_recently_played_page()
            .with(eq(Some(1709662610104)))
            .times(1)
            .returning(|_| Ok(fixture_page("recently_played_page2.json")));

        let mut iterator = RecentlyPlayedIterator::new(mock_api, TimeRange::unbounded());
        let records = iterator.collect_all().await?;
        assert_eq!(records.len(), 3);
        assert_eq!(iterator.current_page(), 2);

        let mut session =
            Session::from_records(DataSource::LiveFetch, records, &AnalyzerConfig::default())?;
        let summary = session.summarize(&AggregateRequest::new(Metric::Plays, GroupBy::Artist, 5))?;

        assert_eq!(summary.ranking[0].entity_name, "Taylor Swift");
        assert_eq!(summary.ranking[0].play_count, 2);
        assert_eq!(summary.ranking[1].entity_name, "The Weeknd");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_range_start_stops_paging() -> Result<()> {
        let mut mock_api = MockRecentlyPlayedApi::new();

        // Page one already reaches back past the start, so page two is never requested
        mock_api
            .expect_recently_played_page()
            .times(1)
            .returning(|_| Ok(fixture_page("recently_played_page1.json")));

        let start = Utc.with_ymd_and_hms(2024, 3, 5, 18, 18, 0).unwrap();
        let range = TimeRange::new(Some(start), None)?;
        let records = RecentlyPlayedIterator::new(mock_api, range)
            .collect_all()
            .await?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("track_name"), Some("Anti-Hero"));

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_adapter_errors_reach_the_caller() {
        let mut mock_api = MockRecentlyPlayedApi::new();

        mock_api
            .expect_recently_played_page()
            .times(1)
            .returning(|_| Err(HistoryError::Authentication("token revoked".to_string())));

        let mut iterator = RecentlyPlayedIterator::new(mock_api, TimeRange::unbounded());
        assert!(matches!(
            iterator.next().await,
            Err(HistoryError::Authentication(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_end_bound_becomes_first_cursor() -> Result<()> {
        let mut mock_api = MockRecentlyPlayedApi::new();
        let end = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();

        mock_api
            .expect_recently_played_page()
            .with(eq(Some(end.timestamp_millis())))
            .times(1)
            .returning(|_| Ok(fixture_page("recently_played_page2.json")));

        let records = RecentlyPlayedIterator::new(mock_api, TimeRange::new(None, Some(end))?)
            .take(10)
            .await?;
        assert_eq!(records.len(), 1);

        Ok(())
    }
}
