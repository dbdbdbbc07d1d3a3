//! Runs the paginated report query of one window and transforms its rows.

use crate::client::{ReportQuery, ReportingApiClient, SamplingLevel};
use crate::models::{DateWindow, OutputRecord, ReportPage, StreamSchema};
use crate::transform::transform;
use common::{DataError, Result};
use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

/// Outcome of transforming one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    Record(OutputRecord),
    /// The row could not be coerced to the schema and is skipped.
    Rejected(DataError),
}

enum PageCursor {
    First,
    Next(String),
    Exhausted,
}

pub struct ReportQueryExecutor {
    client: Arc<dyn ReportingApiClient>,
    view_id: String,
    sampling_level: SamplingLevel,
    segment_id: Option<String>,
}

impl ReportQueryExecutor {
    pub fn new(
        client: Arc<dyn ReportingApiClient>,
        view_id: &str,
        sampling_level: SamplingLevel,
        segment_id: Option<&str>,
    ) -> Self {
        Self {
            client,
            view_id: view_id.to_string(),
            sampling_level,
            segment_id: segment_id.map(str::to_string),
        }
    }

    /// Lazily fetch and transform every row of `window`.
    ///
    /// Pages are requested only as the stream is polled, and rows are yielded
    /// as soon as their page arrives. Client errors end the stream unchanged;
    /// there is no retry at this level.
    pub fn execute<'a>(
        &'a self,
        schema: &'a StreamSchema,
        window: DateWindow,
    ) -> impl Stream<Item = Result<Transformed>> + 'a {
        stream::try_unfold(PageCursor::First, move |cursor| {
            self.fetch_page(schema, window, cursor)
        })
        .map_ok(move |page: ReportPage| {
            let fetched_at = page.fetched_at;
            stream::iter(page.rows.into_iter().map(move |row| -> Result<Transformed> {
                Ok(
                    match transform(&row, schema, &self.view_id, window, fetched_at) {
                        Ok(record) => Transformed::Record(record),
                        Err(e) => Transformed::Rejected(e),
                    },
                )
            }))
        })
        .try_flatten()
    }

    async fn fetch_page(
        &self,
        schema: &StreamSchema,
        window: DateWindow,
        cursor: PageCursor,
    ) -> Result<Option<(ReportPage, PageCursor)>> {
        let page_token = match cursor {
            PageCursor::First => None,
            PageCursor::Next(token) => Some(token),
            PageCursor::Exhausted => return Ok(None),
        };

        let query = ReportQuery {
            view_id: self.view_id.clone(),
            dimensions: schema.dimension_sources(),
            metrics: schema.metric_sources(),
            window,
            sampling_level: self.sampling_level,
            segment_id: self.segment_id.clone(),
            page_token,
        };

        let page = self.client.query(&query).await?;
        let next = match page.next_page_token.as_deref() {
            Some(token) if !token.is_empty() => PageCursor::Next(token.to_string()),
            _ => PageCursor::Exhausted,
        };

        Ok(Some((page, next)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::models::ReportDefinition;
    use crate::test_support::{Scripted, ScriptedClient, date, raw_row};
    use common::Error;
    use futures::StreamExt;

    fn schema(segmented: bool) -> StreamSchema {
        let dimensions: &[&str] = if segmented {
            &["ga:date", "ga:segment"]
        } else {
            &["ga:date", "ga:source"]
        };
        let definition = ReportDefinition::new("traffic", dimensions, &["ga:sessions"]);
        catalog::build(&[definition], None).unwrap().streams()[0].clone()
    }

    fn window() -> DateWindow {
        DateWindow::new(date("2019-05-01"), date("2019-05-07"))
    }

    #[tokio::test]
    async fn test_follows_page_tokens() {
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            None,
            Scripted::Page {
                rows: vec![raw_row(&["20190501", "google"], &["4"])],
                next_page_token: Some("1".into()),
            },
        );
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            Some("1"),
            Scripted::Page {
                rows: vec![
                    raw_row(&["20190502", "google"], &["5"]),
                    raw_row(&["20190503", "bing"], &["6"]),
                ],
                next_page_token: None,
            },
        );

        let executor = ReportQueryExecutor::new(client.clone(), "123456", SamplingLevel::Small, None);
        let schema = schema(false);
        let items: Vec<Transformed> = executor.execute(&schema, window()).try_collect().await.unwrap();

        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| matches!(i, Transformed::Record(_))));

        let queries = client.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].page_token, None);
        assert_eq!(queries[1].page_token.as_deref(), Some("1"));
        assert_eq!(queries[0].dimensions, vec!["ga:date", "ga:source"]);
        assert_eq!(queries[0].sampling_level, SamplingLevel::Small);
        assert_eq!(queries[0].window, window());
    }

    #[tokio::test]
    async fn test_forwards_segment() {
        let client = Arc::new(ScriptedClient::new());
        let executor = ReportQueryExecutor::new(
            client.clone(),
            "123456",
            SamplingLevel::Default,
            Some("gaid::-3"),
        );
        let schema = schema(true);
        let items: Vec<Transformed> = executor.execute(&schema, window()).try_collect().await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(client.queries()[0].segment_id.as_deref(), Some("gaid::-3"));
    }

    #[tokio::test]
    async fn test_bad_rows_are_rejected_individually() {
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            None,
            Scripted::Page {
                rows: vec![
                    raw_row(&["20190501", "google"], &["4"]),
                    raw_row(&["20190501", "bing"], &["lots"]),
                    raw_row(&["20190501", "direct"], &["2"]),
                ],
                next_page_token: None,
            },
        );

        let executor = ReportQueryExecutor::new(client, "123456", SamplingLevel::Default, None);
        let schema = schema(false);
        let items: Vec<Transformed> = executor.execute(&schema, window()).try_collect().await.unwrap();

        assert!(matches!(items[0], Transformed::Record(_)));
        match &items[1] {
            Transformed::Rejected(e) => assert_eq!(e.field, "ga_sessions"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(matches!(items[2], Transformed::Record(_)));
    }

    #[tokio::test]
    async fn test_fetch_error_ends_stream_after_earlier_pages() {
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            None,
            Scripted::Page {
                rows: vec![raw_row(&["20190501", "google"], &["4"])],
                next_page_token: Some("1".into()),
            },
        );
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            Some("1"),
            Scripted::FetchFailure("backend unavailable".into()),
        );

        let executor = ReportQueryExecutor::new(client, "123456", SamplingLevel::Default, None);
        let schema = schema(false);
        let items: Vec<Result<Transformed>> = executor.execute(&schema, window()).collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::Fetch(_))));
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let client = Arc::new(ScriptedClient::new());
        client.script(
            "ga:sessions",
            date("2019-05-01"),
            None,
            Scripted::Page {
                rows: vec![raw_row(&["20190501", "google"], &["4"])],
                next_page_token: Some("1".into()),
            },
        );

        let executor = ReportQueryExecutor::new(client.clone(), "123456", SamplingLevel::Default, None);
        let schema = schema(false);
        let first: Vec<Result<Transformed>> = executor.execute(&schema, window()).take(1).collect().await;

        assert_eq!(first.len(), 1);
        assert_eq!(client.queries().len(), 1);
    }
}
