//! Drives every stream through its planned windows and commits bookmarks.

use crate::catalog;
use crate::client::{ReportingApiClient, SamplingLevel};
use crate::executor::{ReportQueryExecutor, Transformed};
use crate::models::{DateWindow, ReportDefinition, StreamSchema};
use crate::output::OutputSink;
use crate::planner::{self, BatchingMode, DateBatches};
use crate::state::{Bookmarks, StateSink};
use chrono::NaiveDate;
use common::config::Settings;
use common::{Error, ErrorKind, Result};
use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Typed run options resolved from [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub view_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub batching: BatchingMode,
    pub lookback_days: i64,
    pub sampling_level: SamplingLevel,
    pub segment_id: Option<String>,
    /// Streams to sync; `None` syncs every definition.
    pub selected_streams: Option<BTreeSet<String>>,
}

impl SyncOptions {
    /// `today` anchors the default end date, which is the day before it.
    pub fn from_settings(settings: &Settings, today: NaiveDate) -> Result<Self> {
        let view_id = settings.view_id.trim();
        if view_id.is_empty() {
            return Err(Error::invalid_config("view_id must not be empty"));
        }

        let start_date = parse_date("start_date", &settings.start_date)?;
        let end_date = match non_empty(settings.end_date.as_deref()) {
            Some(raw) => parse_date("end_date", raw)?,
            None => today
                .pred_opt()
                .ok_or_else(|| Error::invalid_config("cannot derive end_date from today"))?,
        };
        if start_date > end_date {
            return Err(Error::invalid_config(format!(
                "start_date {start_date} is after end_date {end_date}"
            )));
        }

        let batching: BatchingMode = settings.date_batching.parse()?;

        if settings.lookback_days < 0 {
            return Err(Error::invalid_config(format!(
                "lookback_days must not be negative, got {}",
                settings.lookback_days
            )));
        }

        let sampling_level = settings
            .sampling_level
            .parse::<SamplingLevel>()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to DEFAULT sampling");
                SamplingLevel::Default
            });

        Ok(Self {
            view_id: view_id.to_string(),
            start_date,
            end_date,
            batching,
            lookback_days: settings.lookback_days,
            sampling_level,
            segment_id: non_empty(settings.segment_id.as_deref()).map(str::to_string),
            selected_streams: None,
        })
    }

    pub fn is_selected(&self, stream: &str) -> bool {
        self.selected_streams
            .as_ref()
            .is_none_or(|selected| selected.contains(stream))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        Error::invalid_config(format!("{key} '{raw}' is not a YYYY-MM-DD date: {e}"))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Pending,
    Fetching,
    Transforming,
    Committed,
    Done,
    Failed,
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StreamPhase::Pending => "PENDING",
            StreamPhase::Fetching => "FETCHING",
            StreamPhase::Transforming => "TRANSFORMING",
            StreamPhase::Committed => "COMMITTED",
            StreamPhase::Done => "DONE",
            StreamPhase::Failed => "FAILED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamReport {
    pub stream: String,
    pub status: StreamStatus,
    pub windows_committed: usize,
    pub records_emitted: u64,
    pub data_errors: u64,
    pub error: Option<String>,
}

impl StreamReport {
    fn new(stream: &str) -> Self {
        Self {
            stream: stream.to_string(),
            status: StreamStatus::Done,
            windows_committed: 0,
            records_emitted: 0,
            data_errors: 0,
            error: None,
        }
    }
}

/// Outcome of a run: the final bookmarks plus one report per stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSummary {
    pub bookmarks: Bookmarks,
    pub streams: Vec<StreamReport>,
}

impl SyncSummary {
    pub fn total_data_errors(&self) -> u64 {
        self.streams.iter().map(|s| s.data_errors).sum()
    }

    pub fn failed_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| s.status == StreamStatus::Failed)
            .map(|s| s.stream.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.streams.iter().all(|s| s.status == StreamStatus::Done)
    }
}

/// Sequential driver over all streams of a run.
///
/// Bookmarks only move when a window has been emitted completely, and the full
/// mapping is persisted right after each such commit. A fetch failure stops
/// its own stream only; auth and internal failures abort the run.
pub struct SyncCoordinator {
    client: Arc<dyn ReportingApiClient>,
    output: Arc<dyn OutputSink>,
    state: Arc<dyn StateSink>,
}

impl SyncCoordinator {
    pub fn new(
        client: Arc<dyn ReportingApiClient>,
        output: Arc<dyn OutputSink>,
        state: Arc<dyn StateSink>,
    ) -> Self {
        Self {
            client,
            output,
            state,
        }
    }

    pub async fn sync(
        &self,
        definitions: &[ReportDefinition],
        options: &SyncOptions,
        mut bookmarks: Bookmarks,
    ) -> Result<SyncSummary> {
        let (definitions, skipped): (Vec<_>, Vec<_>) = definitions
            .iter()
            .cloned()
            .partition(|d| options.is_selected(&d.name));
        for definition in &skipped {
            info!(stream = %definition.name, "Skipping unselected stream");
        }

        let catalog = catalog::build(&definitions, options.segment_id.as_deref())?;

        // Plan everything first so a bad option fails before any output
        let plans = catalog
            .streams()
            .iter()
            .map(|schema| {
                planner::plan(
                    &schema.stream_name,
                    options.start_date,
                    options.end_date,
                    options.batching,
                    options.lookback_days,
                    &bookmarks,
                )
                .map(|windows| (schema, windows))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            view_id = %options.view_id,
            streams = plans.len(),
            start_date = %options.start_date,
            end_date = %options.end_date,
            sampling_level = %options.sampling_level,
            "Starting sync"
        );

        let executor = ReportQueryExecutor::new(
            self.client.clone(),
            &options.view_id,
            options.sampling_level,
            options.segment_id.as_deref(),
        );

        let mut streams = Vec::with_capacity(plans.len());
        for (schema, windows) in plans {
            let report = self
                .sync_stream(&executor, schema, windows, &mut bookmarks)
                .await?;
            streams.push(report);
        }

        bookmarks.set_currently_syncing(None);
        self.state.persist(&bookmarks).await?;

        let summary = SyncSummary { bookmarks, streams };
        info!(
            streams = summary.streams.len(),
            failed = summary.failed_streams().len(),
            data_errors = summary.total_data_errors(),
            "Sync finished"
        );
        Ok(summary)
    }

    async fn sync_stream(
        &self,
        executor: &ReportQueryExecutor,
        schema: &StreamSchema,
        windows: DateBatches,
        bookmarks: &mut Bookmarks,
    ) -> Result<StreamReport> {
        let stream = schema.stream_name.as_str();
        let mut report = StreamReport::new(stream);

        info!(
            stream,
            phase = %StreamPhase::Pending,
            windows = windows.len(),
            batching = %windows.mode(),
            bookmark = ?bookmarks.get(stream),
            "Starting stream"
        );

        self.output.emit_schema(schema).await?;
        bookmarks.set_currently_syncing(Some(stream));

        for window in windows {
            if let Err(e) = self.sync_window(executor, schema, window, &mut report).await {
                match e.kind() {
                    ErrorKind::Fetch | ErrorKind::Data => {
                        warn!(
                            stream,
                            phase = %StreamPhase::Failed,
                            window_start = %window.start,
                            window_end = %window.end,
                            bookmark = ?bookmarks.get(stream),
                            error = %e,
                            "Stream failed, continuing with the remaining streams"
                        );
                        report.status = StreamStatus::Failed;
                        report.error = Some(e.to_string());
                        return Ok(report);
                    }
                    _ => return Err(e),
                }
            }

            let advanced = bookmarks.advance(stream, window.end);
            self.state.persist(bookmarks).await?;
            report.windows_committed += 1;

            debug!(
                stream,
                phase = %StreamPhase::Committed,
                window_start = %window.start,
                window_end = %window.end,
                advanced,
                "Committed window"
            );
        }

        info!(
            stream,
            phase = %StreamPhase::Done,
            windows = report.windows_committed,
            records = report.records_emitted,
            data_errors = report.data_errors,
            "Stream complete"
        );
        Ok(report)
    }

    async fn sync_window(
        &self,
        executor: &ReportQueryExecutor,
        schema: &StreamSchema,
        window: DateWindow,
        report: &mut StreamReport,
    ) -> Result<()> {
        let stream = schema.stream_name.as_str();
        debug!(
            stream,
            phase = %StreamPhase::Fetching,
            window_start = %window.start,
            window_end = %window.end,
            "Querying window"
        );

        let mut rows = pin!(executor.execute(schema, window));
        let mut transforming = false;

        while let Some(row) = rows.try_next().await? {
            if !transforming {
                debug!(stream, phase = %StreamPhase::Transforming, %window, "Receiving rows");
                transforming = true;
            }

            match row {
                Transformed::Record(record) => {
                    self.output.emit(stream, &record).await?;
                    report.records_emitted += 1;
                }
                Transformed::Rejected(e) => {
                    warn!(
                        stream,
                        %window,
                        field = %e.field,
                        value = %e.value,
                        reason = %e.reason,
                        "Skipping row that does not fit the stream schema"
                    );
                    report.data_errors += 1;
                }
            }
        }

        Ok(())
    }
}
