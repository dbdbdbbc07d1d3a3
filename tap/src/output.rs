//! Where schemas, records and state messages are written.

use crate::models::{OutputRecord, RECORD_TIMESTAMP, StreamSchema};
use crate::state::{Bookmarks, StateSink};
use async_trait::async_trait;
use chrono::Utc;
use common::Result;
use serde_json::{Value, json};
use std::io::Write;
use tokio::sync::Mutex;

#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Called once per stream, before its first record.
    async fn emit_schema(&self, schema: &StreamSchema) -> Result<()>;
    async fn emit(&self, stream_name: &str, record: &OutputRecord) -> Result<()>;
}

/// Writes newline-delimited `SCHEMA`, `RECORD` and `STATE` messages.
///
/// Doubles as a [`StateSink`]: the state handed in at construction is what
/// `load` returns, and every persist emits a `STATE` message.
pub struct SingerWriter<W> {
    writer: Mutex<W>,
    initial_state: Bookmarks,
}

impl<W: Write + Send> SingerWriter<W> {
    pub fn new(writer: W, initial_state: Bookmarks) -> Self {
        Self {
            writer: Mutex::new(writer),
            initial_state,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_message(&self, message: &Value) -> Result<()> {
        let mut writer = self.writer.lock().await;
        serde_json::to_writer(&mut *writer, message)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> OutputSink for SingerWriter<W> {
    async fn emit_schema(&self, schema: &StreamSchema) -> Result<()> {
        self.write_message(&json!({
            "type": "SCHEMA",
            "stream": schema.stream_name,
            "schema": schema.json_schema(),
            "key_properties": schema.key_properties,
            "bookmark_properties": [RECORD_TIMESTAMP],
        }))
        .await
    }

    async fn emit(&self, stream_name: &str, record: &OutputRecord) -> Result<()> {
        let record = serde_json::to_value(record)?;
        self.write_message(&json!({
            "type": "RECORD",
            "stream": stream_name,
            "record": record,
            "time_extracted": Utc::now().to_rfc3339(),
        }))
        .await
    }
}

#[async_trait]
impl<W: Write + Send> StateSink for SingerWriter<W> {
    async fn load(&self) -> Result<Bookmarks> {
        Ok(self.initial_state.clone())
    }

    async fn persist(&self, bookmarks: &Bookmarks) -> Result<()> {
        let value = serde_json::to_value(bookmarks)?;
        self.write_message(&json!({
            "type": "STATE",
            "value": value,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::models::{DateWindow, RawRow, ReportDefinition};
    use crate::transform::transform;
    use chrono::NaiveDate;

    fn lines(writer: SingerWriter<Vec<u8>>) -> Vec<Value> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_writes_schema_record_and_state_messages() {
        let definition = ReportDefinition::new("traffic", &["ga:date"], &["ga:sessions"]);
        let catalog = catalog::build(&[definition], None).unwrap();
        let schema = &catalog.streams()[0];
        let day = NaiveDate::from_ymd_opt(2019, 5, 1).unwrap();
        let record = transform(
            &RawRow {
                dimensions: vec!["20190501".into()],
                metrics: vec!["3".into()],
            },
            schema,
            "123456",
            DateWindow::new(day, day),
            Utc::now(),
        )
        .unwrap();

        let writer = SingerWriter::new(Vec::new(), Bookmarks::new());
        writer.emit_schema(schema).await.unwrap();
        writer.emit("traffic", &record).await.unwrap();

        let mut bookmarks = Bookmarks::new();
        bookmarks.advance("traffic", day);
        writer.persist(&bookmarks).await.unwrap();

        let messages = lines(writer);
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0]["type"], "SCHEMA");
        assert_eq!(messages[0]["key_properties"], json!(["_sdc_record_hash", "ga_date"]));

        assert_eq!(messages[1]["type"], "RECORD");
        assert_eq!(messages[1]["record"]["ga_sessions"], 3);
        assert_eq!(messages[1]["record"]["_sdc_record_hash"], record.record_hash.as_str());
        assert!(messages[1]["record"]["_sdc_record_timestamp"].is_string());

        assert_eq!(messages[2]["type"], "STATE");
        assert_eq!(
            messages[2]["value"]["bookmarks"]["traffic"]["last_report_date"],
            "2019-05-01"
        );
    }

    #[tokio::test]
    async fn test_load_returns_initial_state() {
        let mut initial = Bookmarks::new();
        initial.advance("traffic", NaiveDate::from_ymd_opt(2019, 5, 1).unwrap());

        let writer = SingerWriter::new(Vec::new(), initial.clone());
        assert_eq!(writer.load().await.unwrap(), initial);
    }
}
