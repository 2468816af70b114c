use crate::api::{RecentlyPlayedApi, TimeRange};
use crate::normalize::parse_timestamp;
use crate::types::{fields, RawRecord};
use crate::Result;

use async_trait::async_trait;
use futures::stream::{self, Stream};

/// Async iterator trait for paginated Web API data.
///
/// Pages are fetched lazily as items are consumed, so dropping the iterator
/// cancels the remaining fetch.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait(?Send)]
pub trait AsyncPaginatedIterator<T> {
    /// Fetch the next item from the iterator.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(item))` - Next item in the sequence
    /// - `Ok(None)` - No more items available
    /// - `Err(...)` - Network, status or parsing error
    async fn next(&mut self) -> Result<Option<T>>;

    /// Collect all remaining items into a Vec.
    ///
    /// **Warning**: this fetches every remaining page. Use
    /// [`take`](Self::take) for bounded collection.
    async fn collect_all(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Take up to n items from the iterator.
    async fn take(&mut self, n: usize) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for _ in 0..n {
            match self.next().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    /// Number of pages fetched so far.
    fn current_page(&self) -> u32;

    /// Get the total number of pages, if known.
    fn total_pages(&self) -> Option<u32> {
        None
    }
}

/// Adapt an [`AsyncPaginatedIterator`] into a [`Stream`].
///
/// The stream ends after the first error.
pub fn into_stream<T, I>(iter: I) -> impl Stream<Item = Result<T>>
where
    I: AsyncPaginatedIterator<T>,
{
    stream::unfold((iter, false), |(mut iter, failed)| async move {
        if failed {
            return None;
        }
        match iter.next().await {
            Ok(Some(item)) => Some((Ok(item), (iter, false))),
            Ok(None) => None,
            Err(e) => Some((Err(e), (iter, true))),
        }
    })
}

/// Iterator over a user's recently-played history within a [`TimeRange`].
///
/// Paging walks backwards in time with the `before` cursor, starting at
/// `range.end`. It stops when a page has no successor, when a page reaches
/// back past `range.start`, or after `max_pages`. Records whose played-at
/// cannot be read are passed through so the normalizer can count them.
pub struct RecentlyPlayedIterator<C: RecentlyPlayedApi> {
    client: C,
    range: TimeRange,
    before: Option<i64>,
    buffer: Vec<RawRecord>,
    pages_fetched: u32,
    max_pages: Option<u32>,
    has_more: bool,
}

#[async_trait(?Send)]
impl<C: RecentlyPlayedApi> AsyncPaginatedIterator<RawRecord> for RecentlyPlayedIterator<C> {
    async fn next(&mut self) -> Result<Option<RawRecord>> {
        while self.buffer.is_empty() {
            if !self.has_more {
                return Ok(None);
            }
            self.fetch_page().await?;
        }

        Ok(self.buffer.pop())
    }

    fn current_page(&self) -> u32 {
        self.pages_fetched
    }
}

impl<C: RecentlyPlayedApi> RecentlyPlayedIterator<C> {
    pub fn new(client: C, range: TimeRange) -> Self {
        Self {
            client,
            range,
            before: range.end.map(|end| end.timestamp_millis()),
            buffer: Vec::new(),
            pages_fetched: 0,
            max_pages: None,
            has_more: true,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self.client.recently_played_page(self.before).await?;
        self.pages_fetched += 1;
        log::debug!(
            "Recently played page {} returned {} items",
            self.pages_fetched,
            page.records.len()
        );

        let was_empty = page.records.is_empty();
        let mut reached_start = false;
        let mut kept = Vec::with_capacity(page.records.len());
        for record in page.records {
            match record
                .get(fields::PLAYED_AT)
                .and_then(|value| parse_timestamp(value).ok())
            {
                Some(at) if self.range.is_before_start(at) => reached_start = true,
                Some(at) if !self.range.contains(at) => {}
                _ => kept.push(record),
            }
        }

        let page_limit_reached = self
            .max_pages
            .is_some_and(|max| self.pages_fetched >= max);
        self.has_more = page.has_next_page
            && !was_empty
            && !reached_start
            && !page_limit_reached;
        self.before = page.next_before;

        if page_limit_reached && page.has_next_page {
            log::info!("Stopped after {} pages", self.pages_fetched);
        }

        kept.reverse(); // Reverse so we can pop from end efficiently
        self.buffer = kept;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RecentlyPlayedPage;
    use crate::HistoryError;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedApi {
        pages: RefCell<VecDeque<Result<RecentlyPlayedPage>>>,
        requested: RefCell<Vec<Option<i64>>>,
    }

    impl ScriptedApi {
        fn new(pages: Vec<Result<RecentlyPlayedPage>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl<'a> RecentlyPlayedApi for &'a ScriptedApi {
        async fn recently_played_page(&self, before: Option<i64>) -> Result<RecentlyPlayedPage> {
            self.requested.borrow_mut().push(before);
            self.pages
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(RecentlyPlayedPage::default()))
        }
    }

    fn record(track: &str, played_at: &str) -> RawRecord {
        [
            ("track_name", track),
            ("artist_name", "Artist"),
            ("played_at", played_at),
        ]
        .into_iter()
        .collect()
    }

    fn page(records: Vec<RawRecord>, next_before: Option<i64>) -> RecentlyPlayedPage {
        RecentlyPlayedPage {
            records,
            has_next_page: next_before.is_some(),
            next_before,
        }
    }

    fn tracks(records: &[RawRecord]) -> Vec<&str> {
        records.iter().filter_map(|r| r.get("track_name")).collect()
    }

    #[test]
    fn test_follows_cursor_until_last_page() {
        let api = ScriptedApi::new(vec![
            Ok(page(
                vec![
                    record("C", "2024-03-03T00:00:00Z"),
                    record("B", "2024-03-02T00:00:00Z"),
                ],
                Some(1709337600000),
            )),
            Ok(page(vec![record("A", "2024-03-01T00:00:00Z")], None)),
        ]);

        let mut iter = RecentlyPlayedIterator::new(&api, TimeRange::unbounded());
        let records = tokio_test::block_on(iter.collect_all()).unwrap();

        assert_eq!(tracks(&records), vec!["C", "B", "A"]);
        assert_eq!(iter.current_page(), 2);
        assert_eq!(*api.requested.borrow(), vec![None, Some(1709337600000)]);
    }

    #[test]
    fn test_stops_at_range_start_and_drops_outside_items() {
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        let api = ScriptedApi::new(vec![Ok(page(
            vec![
                record("on-end", "2024-03-03T00:00:00Z"),
                record("inside", "2024-03-02T12:00:00Z"),
                record("too-old", "2024-03-01T23:59:59Z"),
            ],
            Some(1),
        ))]);

        let range = TimeRange::new(Some(start), Some(end)).unwrap();
        let mut iter = RecentlyPlayedIterator::new(&api, range);
        let records = tokio_test::block_on(iter.collect_all()).unwrap();

        assert_eq!(tracks(&records), vec!["inside"]);
        assert_eq!(*api.requested.borrow(), vec![Some(end.timestamp_millis())]);
    }

    #[test]
    fn test_unreadable_timestamps_pass_through() {
        let api = ScriptedApi::new(vec![Ok(page(vec![record("odd", "yesterday")], None))]);
        let range = TimeRange::new(Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()), None)
            .unwrap();

        let mut iter = RecentlyPlayedIterator::new(&api, range);
        let records = tokio_test::block_on(iter.collect_all()).unwrap();
        assert_eq!(tracks(&records), vec!["odd"]);
    }

    #[test]
    fn test_max_pages() {
        let api = ScriptedApi::new(vec![
            Ok(page(vec![record("B", "2024-03-02T00:00:00Z")], Some(2))),
            Ok(page(vec![record("A", "2024-03-01T00:00:00Z")], Some(1))),
        ]);

        let mut iter =
            RecentlyPlayedIterator::new(&api, TimeRange::unbounded()).with_max_pages(Some(1));
        let records = tokio_test::block_on(iter.collect_all()).unwrap();
        assert_eq!(tracks(&records), vec!["B"]);
        assert_eq!(api.requested.borrow().len(), 1);
    }

    #[test]
    fn test_empty_page_ends_iteration() {
        let api = ScriptedApi::new(vec![Ok(page(Vec::new(), Some(5)))]);
        let mut iter = RecentlyPlayedIterator::new(&api, TimeRange::unbounded());
        assert!(tokio_test::block_on(iter.next()).unwrap().is_none());
        assert_eq!(api.requested.borrow().len(), 1);
    }

    #[test]
    fn test_errors_propagate() {
        let api = ScriptedApi::new(vec![Err(HistoryError::RateLimit { retry_after: 5 })]);
        let mut iter = RecentlyPlayedIterator::new(&api, TimeRange::unbounded());
        assert!(matches!(
            tokio_test::block_on(iter.take(10)),
            Err(HistoryError::RateLimit { retry_after: 5 })
        ));
    }

    #[test]
    fn test_stream_ends_after_error() {
        let api = ScriptedApi::new(vec![
            Ok(page(vec![record("B", "2024-03-02T00:00:00Z")], Some(2))),
            Err(HistoryError::Http("connection reset".to_string())),
        ]);
        let iter = RecentlyPlayedIterator::new(&api, TimeRange::unbounded());

        let items: Vec<Result<RawRecord>> = tokio_test::block_on(into_stream(iter).collect());
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(HistoryError::Http(_))));
    }
}
