//! Splits a date range into the query windows of one stream.

use crate::models::DateWindow;
use crate::state::Bookmarks;
use chrono::{Days, NaiveDate};
use common::{Error, Result};
use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;
use tracing::debug;

/// Incremental runs spanning fewer days than this are always queried day by day.
pub const DAY_BATCHING_THRESHOLD_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchingMode {
    Day,
    Week,
    /// Fixed 30 day windows, not calendar months.
    Month,
}

impl BatchingMode {
    pub fn window_days(&self) -> u64 {
        match self {
            BatchingMode::Day => 1,
            BatchingMode::Week => 7,
            BatchingMode::Month => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchingMode::Day => "DAY",
            BatchingMode::Week => "WEEK",
            BatchingMode::Month => "MONTH",
        }
    }
}

impl FromStr for BatchingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAY" => Ok(BatchingMode::Day),
            "WEEK" => Ok(BatchingMode::Week),
            "MONTH" => Ok(BatchingMode::Month),
            other => Err(Error::invalid_config(format!(
                "unknown date batching '{other}', expected one of DAY, WEEK, MONTH"
            ))),
        }
    }
}

impl fmt::Display for BatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plan the query windows for `stream_name`.
///
/// With a bookmark the range restarts `lookback_days` before it, but never
/// before `start_date`. Incremental ranges shorter than
/// [`DAY_BATCHING_THRESHOLD_DAYS`] are batched by day whatever `mode` says.
pub fn plan(
    stream_name: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    mode: BatchingMode,
    lookback_days: i64,
    bookmarks: &Bookmarks,
) -> Result<DateBatches> {
    if lookback_days < 0 {
        return Err(Error::invalid_config(format!(
            "lookback_days must not be negative, got {lookback_days}"
        )));
    }

    let bookmark = bookmarks.get(stream_name);
    let effective_start = match bookmark {
        Some(last) => last
            .checked_sub_days(Days::new(lookback_days as u64))
            .map_or(start_date, |d| d.max(start_date)),
        None => start_date,
    };

    let span_days = (end_date - effective_start).num_days();
    let mode = if bookmark.is_some() && span_days < DAY_BATCHING_THRESHOLD_DAYS {
        BatchingMode::Day
    } else {
        mode
    };

    debug!(
        stream = stream_name,
        ?bookmark,
        %effective_start,
        %end_date,
        span_days,
        batching = %mode,
        "Planned date batches"
    );

    Ok(DateBatches::new(effective_start, end_date, mode))
}

/// Lazy, chronologically ordered windows tiling `[start, end]`.
#[derive(Debug, Clone)]
pub struct DateBatches {
    next_start: Option<NaiveDate>,
    end: NaiveDate,
    mode: BatchingMode,
}

impl DateBatches {
    pub fn new(start: NaiveDate, end: NaiveDate, mode: BatchingMode) -> Self {
        Self {
            next_start: (start <= end).then_some(start),
            end,
            mode,
        }
    }

    /// Batching mode in effect, after any forced switch to daily windows.
    pub fn mode(&self) -> BatchingMode {
        self.mode
    }
}

impl Iterator for DateBatches {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.next_start?;
        let end = start
            .checked_add_days(Days::new(self.mode.window_days() - 1))
            .map_or(self.end, |d| d.min(self.end));

        self.next_start = if end < self.end { end.succ_opt() } else { None };

        Some(DateWindow::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next_start {
            None => (0, Some(0)),
            Some(start) => {
                let days = ((self.end - start).num_days() + 1) as u64;
                let windows = days.div_ceil(self.mode.window_days()) as usize;
                (windows, Some(windows))
            }
        }
    }
}

impl ExactSizeIterator for DateBatches {}

impl FusedIterator for DateBatches {}
