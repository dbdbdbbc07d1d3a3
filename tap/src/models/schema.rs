use serde::Serialize;
use serde_json::{Value, json};

pub const REPORT_START_DATE: &str = "report_start_date";
pub const REPORT_END_DATE: &str = "report_end_date";
pub const RECORD_HASH: &str = "_sdc_record_hash";
pub const RECORD_TIMESTAMP: &str = "_sdc_record_timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Date,
    Integer,
    Number,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Dimension,
    Metric,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaField {
    /// Output name, e.g. `ga_date`.
    pub name: String,
    /// Name used when querying the API, e.g. `ga:date`. `None` for synthetic fields.
    pub source_name: Option<String>,
    pub field_type: FieldType,
    pub role: FieldRole,
}

impl SchemaField {
    fn json_schema(&self) -> Value {
        match (self.field_type, self.role) {
            (FieldType::String, _) => json!({ "type": ["string"] }),
            (FieldType::Date, _) => json!({ "type": ["string"], "format": "date" }),
            (FieldType::Timestamp, _) => json!({ "type": ["string"], "format": "date-time" }),
            // Metrics may be absent from a row, dimensions never are
            (FieldType::Integer, FieldRole::Metric) => json!({ "type": ["null", "integer"] }),
            (FieldType::Number, FieldRole::Metric) => json!({ "type": ["null", "number"] }),
            (FieldType::Integer, _) => json!({ "type": ["integer"] }),
            (FieldType::Number, _) => json!({ "type": ["number"] }),
        }
    }
}

/// Schema of one stream, derived from its report definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSchema {
    pub stream_name: String,
    pub fields: Vec<SchemaField>,
    pub key_properties: Vec<String>,
}

impl StreamSchema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Dimension fields in declared order.
    pub fn dimensions(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.role == FieldRole::Dimension)
    }

    /// Metric fields in declared order.
    pub fn metrics(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.role == FieldRole::Metric)
    }

    pub fn dimension_sources(&self) -> Vec<String> {
        self.dimensions()
            .filter_map(|f| f.source_name.clone())
            .collect()
    }

    pub fn metric_sources(&self) -> Vec<String> {
        self.metrics().filter_map(|f| f.source_name.clone()).collect()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// JSON schema of a record in this stream.
    pub fn json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.json_schema()))
            .collect();

        json!({
            "type": ["null", "object"],
            "additionalProperties": false,
            "properties": properties,
        })
    }

    fn metadata(&self) -> Value {
        let mut entries = vec![json!({
            "breadcrumb": [],
            "metadata": {
                "inclusion": "automatic",
                "table-key-properties": self.key_properties,
                "replication-method": "INCREMENTAL",
                "replication-key": RECORD_TIMESTAMP,
                "schema-name": self.stream_name,
            }
        })];

        for field in self.fields.iter().filter(|f| f.role != FieldRole::Synthetic) {
            entries.push(json!({
                "breadcrumb": ["properties", field.name],
                "metadata": {
                    "inclusion": "automatic",
                    "selected-by-default": true,
                    "ga_type": field.role,
                    "ga_name": field.source_name,
                }
            }));
        }

        Value::Array(entries)
    }
}

/// All stream schemas of a run, in report definition order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    streams: Vec<StreamSchema>,
}

impl Catalog {
    pub(crate) fn from_streams(streams: Vec<StreamSchema>) -> Self {
        Self { streams }
    }

    pub fn streams(&self) -> &[StreamSchema] {
        &self.streams
    }

    pub fn get(&self, stream_name: &str) -> Option<&StreamSchema> {
        self.streams.iter().find(|s| s.stream_name == stream_name)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Render the catalog in the discovery format consumed by targets.
    pub fn to_singer_json(&self) -> Value {
        let streams: Vec<Value> = self
            .streams
            .iter()
            .map(|s| {
                json!({
                    "stream": s.stream_name,
                    "tap_stream_id": s.stream_name,
                    "schema": s.json_schema(),
                    "key_properties": s.key_properties,
                    "metadata": s.metadata(),
                })
            })
            .collect();

        json!({ "streams": streams })
    }
}
