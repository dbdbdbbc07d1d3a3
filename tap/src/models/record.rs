use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// One row as returned by the reporting API.
///
/// Values are positional and follow the order in which the stream's
/// dimensions and metrics were requested.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawRow {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
}

/// A single page of a report query.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPage {
    pub rows: Vec<RawRow>,
    pub next_page_token: Option<String>,
    /// When the API response was received.
    pub fetched_at: DateTime<Utc>,
}

/// A transformed, schema-conformant record ready to be emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(rename = "_sdc_record_hash")]
    pub record_hash: String,
    #[serde(rename = "_sdc_record_timestamp")]
    pub record_timestamp: DateTime<Utc>,
}

impl OutputRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
