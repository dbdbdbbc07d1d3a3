//! Per-stream bookmarks and where they are persisted.
//!
//! [`Bookmarks`] is owned by the sync coordinator for the whole run; a
//! [`StateSink`] receives the full mapping after every committed window.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBookmark {
    pub last_report_date: NaiveDate,
}

/// Last completed report date per stream, in the interchange state format.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bookmarks {
    #[serde(default)]
    bookmarks: BTreeMap<String, StreamBookmark>,
    #[serde(default)]
    currently_syncing: Option<String>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream: &str) -> Option<NaiveDate> {
        self.bookmarks.get(stream).map(|b| b.last_report_date)
    }

    /// Move a stream's bookmark forward to `date`.
    ///
    /// Returns `false` and leaves the bookmark alone when `date` is not later
    /// than the current one, which happens for lookback windows.
    pub fn advance(&mut self, stream: &str, date: NaiveDate) -> bool {
        match self.bookmarks.get_mut(stream) {
            Some(current) if current.last_report_date >= date => false,
            Some(current) => {
                current.last_report_date = date;
                true
            }
            None => {
                self.bookmarks.insert(
                    stream.to_string(),
                    StreamBookmark {
                        last_report_date: date,
                    },
                );
                true
            }
        }
    }

    pub fn currently_syncing(&self) -> Option<&str> {
        self.currently_syncing.as_deref()
    }

    pub fn set_currently_syncing(&mut self, stream: Option<&str>) {
        self.currently_syncing = stream.map(str::to_string);
    }

    pub fn streams(&self) -> impl Iterator<Item = (&str, NaiveDate)> {
        self.bookmarks
            .iter()
            .map(|(name, b)| (name.as_str(), b.last_report_date))
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    pub fn from_json(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(content)?)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::State(format!("failed to read state file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }
}

/// External store for bookmarks. Read once at start, written after each committed window.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn load(&self) -> Result<Bookmarks>;
    async fn persist(&self, bookmarks: &Bookmarks) -> Result<()>;
}

/// Keeps bookmarks in a JSON file, replacing it atomically on every persist.
pub struct JsonFileStateSink {
    path: PathBuf,
}

impl JsonFileStateSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl StateSink for JsonFileStateSink {
    async fn load(&self) -> Result<Bookmarks> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Bookmarks::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, starting from scratch");
                Ok(Bookmarks::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, bookmarks: &Bookmarks) -> Result<()> {
        let body = serde_json::to_vec_pretty(bookmarks)?;
        let temp = self.temp_path();

        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        Ok(())
    }
}
