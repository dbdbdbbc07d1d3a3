use crate::models::{
    DateWindow, FieldType, OutputRecord, REPORT_END_DATE, REPORT_START_DATE, RawRow, SchemaField,
    StreamSchema,
};
use chrono::{DateTime, NaiveDate, Utc};
use common::DataError;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Convert one API row into an output record for `schema`.
///
/// Dimension and metric values are renamed to their output names and coerced
/// to their inferred types. A value that cannot be coerced rejects the whole
/// row with a [`DataError`].
pub fn transform(
    row: &RawRow,
    schema: &StreamSchema,
    view_id: &str,
    window: DateWindow,
    fetched_at: DateTime<Utc>,
) -> Result<OutputRecord, DataError> {
    let dimensions: Vec<&SchemaField> = schema.dimensions().collect();
    let metrics: Vec<&SchemaField> = schema.metrics().collect();

    if row.dimensions.len() != dimensions.len() {
        return Err(DataError::new(
            "dimensions",
            &row.dimensions.join(","),
            format!("expected {} values, got {}", dimensions.len(), row.dimensions.len()),
        ));
    }
    if row.metrics.len() != metrics.len() {
        return Err(DataError::new(
            "metrics",
            &row.metrics.join(","),
            format!("expected {} values, got {}", metrics.len(), row.metrics.len()),
        ));
    }

    let mut fields = Map::new();

    for (field, raw) in dimensions.iter().zip(&row.dimensions) {
        fields.insert(field.name.clone(), coerce(field, raw)?);
    }
    for (field, raw) in metrics.iter().zip(&row.metrics) {
        fields.insert(field.name.clone(), coerce(field, raw)?);
    }

    fields.insert(REPORT_START_DATE.to_string(), Value::String(window.start.to_string()));
    fields.insert(REPORT_END_DATE.to_string(), Value::String(window.end.to_string()));

    Ok(OutputRecord {
        fields,
        record_hash: record_hash(view_id, &row.dimensions),
        record_timestamp: fetched_at,
    })
}

/// SHA-256 over the JSON array `[view_id, dimension values...]`.
///
/// Metric values and window bounds are left out so that rows re-fetched by
/// overlapping lookback windows keep their key. Changing the input layout
/// changes every downstream primary key.
pub fn record_hash(view_id: &str, dimension_values: &[String]) -> String {
    let mut source: Vec<&str> = Vec::with_capacity(dimension_values.len() + 1);
    source.push(view_id);
    source.extend(dimension_values.iter().map(String::as_str));

    // Serializing a slice of strings cannot fail
    let bytes = serde_json::to_vec(&source).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

fn coerce(field: &SchemaField, raw: &str) -> Result<Value, DataError> {
    match field.field_type {
        FieldType::String => Ok(Value::String(raw.to_string())),
        FieldType::Date => parse_report_date(raw)
            .map(|d| Value::String(d.to_string()))
            .ok_or_else(|| DataError::new(&field.name, raw, "expected a date")),
        FieldType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(|v| Value::Number(v.into()))
            .map_err(|_| DataError::new(&field.name, raw, "expected an integer")),
        FieldType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| DataError::new(&field.name, raw, "expected a finite number")),
        // Only synthetic fields are timestamps and they are never read from rows
        FieldType::Timestamp => Err(DataError::new(
            &field.name,
            raw,
            "timestamp fields are not filled from report rows",
        )),
    }
}

/// Dates come back as `YYYYMMDD`; ISO dates are accepted as well.
fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}
