//! Scripted collaborators for unit tests.

use crate::client::{ReportQuery, ReportingApiClient};
use crate::models::{OutputRecord, RawRow, ReportPage, StreamSchema};
use crate::output::OutputSink;
use crate::state::{Bookmarks, StateSink};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub(crate) fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 6, 21, 6, 0, 0).unwrap()
}

pub(crate) fn raw_row(dimensions: &[&str], metrics: &[&str]) -> RawRow {
    RawRow {
        dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
        metrics: metrics.iter().map(|s| s.to_string()).collect(),
    }
}

#[derive(Clone)]
pub(crate) enum Scripted {
    Page {
        rows: Vec<RawRow>,
        next_page_token: Option<String>,
    },
    FetchFailure(String),
    AuthFailure,
}

type ScriptKey = (String, NaiveDate, Option<String>);

/// Reporting client answering from a script keyed by (metrics, window start, page token).
///
/// Unscripted requests get a single generated row: `ga:date` dimensions carry
/// the window start, other dimensions `"value"`, every metric `"1"`.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    responses: Mutex<HashMap<ScriptKey, Scripted>>,
    queries: Mutex<Vec<ReportQuery>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(
        &self,
        metrics: &str,
        start: NaiveDate,
        page_token: Option<&str>,
        response: Scripted,
    ) {
        self.responses.lock().unwrap().insert(
            (metrics.to_string(), start, page_token.map(str::to_string)),
            response,
        );
    }

    pub(crate) fn queries(&self) -> Vec<ReportQuery> {
        self.queries.lock().unwrap().clone()
    }

    fn generated_row(query: &ReportQuery) -> RawRow {
        RawRow {
            dimensions: query
                .dimensions
                .iter()
                .map(|d| {
                    if d == "ga:date" {
                        query.window.start.format("%Y%m%d").to_string()
                    } else {
                        "value".to_string()
                    }
                })
                .collect(),
            metrics: query.metrics.iter().map(|_| "1".to_string()).collect(),
        }
    }
}

#[async_trait]
impl ReportingApiClient for ScriptedClient {
    async fn query(&self, query: &ReportQuery) -> Result<ReportPage> {
        self.queries.lock().unwrap().push(query.clone());

        let key = (
            query.metrics.join(","),
            query.window.start,
            query.page_token.clone(),
        );
        let scripted = self.responses.lock().unwrap().get(&key).cloned();

        match scripted {
            Some(Scripted::Page {
                rows,
                next_page_token,
            }) => Ok(ReportPage {
                rows,
                next_page_token,
                fetched_at: fetched_at(),
            }),
            Some(Scripted::FetchFailure(message)) => Err(Error::Fetch(message)),
            Some(Scripted::AuthFailure) => Err(Error::Auth("token revoked".into())),
            None => Ok(ReportPage {
                rows: vec![Self::generated_row(query)],
                next_page_token: None,
                fetched_at: fetched_at(),
            }),
        }
    }
}

/// Output sink collecting everything it is handed.
#[derive(Default)]
pub(crate) struct MemoryOutput {
    schemas: Mutex<Vec<String>>,
    records: Mutex<Vec<(String, OutputRecord)>>,
}

impl MemoryOutput {
    pub(crate) fn schemas(&self) -> Vec<String> {
        self.schemas.lock().unwrap().clone()
    }

    pub(crate) fn records(&self, stream: &str) -> Vec<OutputRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == stream)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl OutputSink for MemoryOutput {
    async fn emit_schema(&self, schema: &StreamSchema) -> Result<()> {
        self.schemas.lock().unwrap().push(schema.stream_name.clone());
        Ok(())
    }

    async fn emit(&self, stream_name: &str, record: &OutputRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .push((stream_name.to_string(), record.clone()));
        Ok(())
    }
}

/// State sink keeping every persisted snapshot.
#[derive(Default)]
pub(crate) struct MemoryStateSink {
    initial: Bookmarks,
    history: Mutex<Vec<Bookmarks>>,
}

impl MemoryStateSink {
    pub(crate) fn new(initial: Bookmarks) -> Self {
        Self {
            initial,
            history: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn history(&self) -> Vec<Bookmarks> {
        self.history.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> Option<Bookmarks> {
        self.history.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StateSink for MemoryStateSink {
    async fn load(&self) -> Result<Bookmarks> {
        Ok(self.initial.clone())
    }

    async fn persist(&self, bookmarks: &Bookmarks) -> Result<()> {
        self.history.lock().unwrap().push(bookmarks.clone());
        Ok(())
    }
}
