//! Turns report definitions into stream schemas.
//!
//! Types are inferred from dimension and metric names alone so the catalog
//! can be rebuilt offline and always comes out the same for the same input.

use crate::models::{
    Catalog, FieldRole, FieldType, RECORD_HASH, RECORD_TIMESTAMP, REPORT_END_DATE,
    REPORT_START_DATE, ReportDefinition, SchemaField, StreamSchema,
};
use common::{Error, Result};
use std::collections::HashSet;

pub const MAX_DIMENSIONS: usize = 7;
pub const MAX_METRICS: usize = 10;

/// Dimension that must be present when a segment is requested.
pub const SEGMENT_DIMENSION: &str = "ga:segment";

const DATE_DIMENSIONS: &[&str] = &["ga:date"];

const INTEGER_METRICS: &[&str] = &[
    "ga:users",
    "ga:newUsers",
    "ga:1dayUsers",
    "ga:7dayUsers",
    "ga:14dayUsers",
    "ga:28dayUsers",
    "ga:30dayUsers",
    "ga:sessions",
    "ga:bounces",
    "ga:hits",
    "ga:pageviews",
    "ga:uniquePageviews",
    "ga:entrances",
    "ga:exits",
    "ga:screenviews",
    "ga:uniqueScreenviews",
    "ga:totalEvents",
    "ga:uniqueEvents",
    "ga:sessionsWithEvent",
    "ga:searchUniques",
    "ga:searchResultViews",
    "ga:searchSessions",
    "ga:transactions",
    "ga:itemQuantity",
    "ga:uniquePurchases",
    "ga:goalStartsAll",
    "ga:goalCompletionsAll",
    "ga:impressions",
    "ga:adClicks",
];

/// Output name for an API column: namespace separators become underscores.
pub fn output_field_name(source_name: &str) -> String {
    source_name.replace(':', "_")
}

pub fn dimension_type(name: &str) -> FieldType {
    if DATE_DIMENSIONS.contains(&name) {
        FieldType::Date
    } else {
        FieldType::String
    }
}

pub fn metric_type(name: &str) -> FieldType {
    if INTEGER_METRICS.contains(&name) {
        FieldType::Integer
    } else {
        FieldType::Number
    }
}

/// Build the catalog for a run.
///
/// Fails with a configuration error when a stream name is repeated, a
/// definition exceeds the API limits, two columns map to the same output
/// name, or a segment is configured but a definition lacks `ga:segment`.
pub fn build(definitions: &[ReportDefinition], segment_id: Option<&str>) -> Result<Catalog> {
    let mut seen = HashSet::new();
    let mut streams = Vec::with_capacity(definitions.len());

    for definition in definitions {
        validate(definition, segment_id)?;

        if !seen.insert(definition.name.as_str()) {
            return Err(Error::invalid_config(format!(
                "stream '{}' is defined more than once",
                definition.name
            )));
        }

        streams.push(build_stream(definition)?);
    }

    Ok(Catalog::from_streams(streams))
}

fn validate(definition: &ReportDefinition, segment_id: Option<&str>) -> Result<()> {
    let name = &definition.name;

    if name.trim().is_empty() {
        return Err(Error::invalid_config("report definition has an empty name"));
    }

    let dimensions = definition.dimensions.len();
    if !(1..=MAX_DIMENSIONS).contains(&dimensions) {
        return Err(Error::invalid_config(format!(
            "'{name}' has {dimensions} dimensions, reports need between 1 and {MAX_DIMENSIONS}"
        )));
    }

    let metrics = definition.metrics.len();
    if !(1..=MAX_METRICS).contains(&metrics) {
        return Err(Error::invalid_config(format!(
            "'{name}' has {metrics} metrics, reports need between 1 and {MAX_METRICS}"
        )));
    }

    if segment_id.is_some() && !definition.dimensions.iter().any(|d| d == SEGMENT_DIMENSION) {
        return Err(Error::invalid_config(format!(
            "'{name}' must include the {SEGMENT_DIMENSION} dimension when a segment_id is configured"
        )));
    }

    Ok(())
}

fn build_stream(definition: &ReportDefinition) -> Result<StreamSchema> {
    let mut fields = Vec::new();

    for dimension in &definition.dimensions {
        fields.push(SchemaField {
            name: output_field_name(dimension),
            source_name: Some(dimension.clone()),
            field_type: dimension_type(dimension),
            role: FieldRole::Dimension,
        });
    }

    for metric in &definition.metrics {
        fields.push(SchemaField {
            name: output_field_name(metric),
            source_name: Some(metric.clone()),
            field_type: metric_type(metric),
            role: FieldRole::Metric,
        });
    }

    for (name, field_type) in [
        (REPORT_START_DATE, FieldType::Date),
        (REPORT_END_DATE, FieldType::Date),
        (RECORD_HASH, FieldType::String),
        (RECORD_TIMESTAMP, FieldType::Timestamp),
    ] {
        fields.push(SchemaField {
            name: name.to_string(),
            source_name: None,
            field_type,
            role: FieldRole::Synthetic,
        });
    }

    let mut names = HashSet::new();
    for field in &fields {
        if !names.insert(field.name.as_str()) {
            return Err(Error::invalid_config(format!(
                "'{}' has more than one column mapped to output field '{}'",
                definition.name, field.name
            )));
        }
    }

    let key_properties = std::iter::once(RECORD_HASH.to_string())
        .chain(definition.dimensions.iter().map(|d| output_field_name(d)))
        .collect();

    Ok(StreamSchema {
        stream_name: definition.name.clone(),
        fields,
        key_properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traffic() -> ReportDefinition {
        ReportDefinition::new(
            "traffic",
            &["ga:date", "ga:source", "ga:medium"],
            &["ga:sessions", "ga:bounceRate"],
        )
    }

    #[test]
    fn test_builds_fields_with_inferred_types() {
        let catalog = build(&[traffic()], None).unwrap();
        let schema = catalog.get("traffic").unwrap();

        assert_eq!(schema.field("ga_date").unwrap().field_type, FieldType::Date);
        assert_eq!(schema.field("ga_source").unwrap().field_type, FieldType::String);
        assert_eq!(schema.field("ga_sessions").unwrap().field_type, FieldType::Integer);
        assert_eq!(schema.field("ga_bounceRate").unwrap().field_type, FieldType::Number);
        assert_eq!(
            schema.field("ga_date").unwrap().source_name.as_deref(),
            Some("ga:date")
        );

        for synthetic in [REPORT_START_DATE, REPORT_END_DATE, RECORD_HASH, RECORD_TIMESTAMP] {
            assert!(schema.field(synthetic).is_some(), "missing {synthetic}");
        }
        assert_eq!(schema.field(RECORD_TIMESTAMP).unwrap().field_type, FieldType::Timestamp);

        assert_eq!(
            schema.key_properties,
            vec!["_sdc_record_hash", "ga_date", "ga_source", "ga_medium"]
        );
        assert_eq!(schema.dimension_sources(), vec!["ga:date", "ga:source", "ga:medium"]);
        assert_eq!(schema.metric_sources(), vec!["ga:sessions", "ga:bounceRate"]);
    }

    #[test]
    fn test_build_is_deterministic_and_names_unique() {
        let definitions = vec![
            traffic(),
            ReportDefinition::new("pages", &["ga:pagePath"], &["ga:pageviews", "ga:avgTimeOnPage"]),
        ];

        let first = build(&definitions, None).unwrap();
        let second = build(&definitions, None).unwrap();
        assert_eq!(first, second);

        for schema in first.streams() {
            let names: Vec<&str> = schema.field_names().collect();
            let unique: HashSet<&str> = names.iter().copied().collect();
            assert_eq!(names.len(), unique.len());
        }
    }

    #[test]
    fn test_preserves_definition_order() {
        let definitions = vec![
            ReportDefinition::new("zeta", &["ga:date"], &["ga:users"]),
            ReportDefinition::new("alpha", &["ga:date"], &["ga:users"]),
        ];
        let catalog = build(&definitions, None).unwrap();
        let names: Vec<&str> = catalog.streams().iter().map(|s| s.stream_name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_rejects_duplicate_stream_names() {
        let err = build(&[traffic(), traffic()], None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_api_limit_violations() {
        let too_many_dimensions = ReportDefinition::new(
            "wide",
            &["ga:date", "ga:source", "ga:medium", "ga:campaign", "ga:keyword", "ga:country", "ga:city", "ga:browser"],
            &["ga:sessions"],
        );
        assert!(build(&[too_many_dimensions], None).is_err());

        let metrics: Vec<String> = (1..=11).map(|i| format!("ga:metric{i}")).collect();
        let too_many_metrics = ReportDefinition {
            name: "metrics".to_string(),
            dimensions: vec!["ga:date".to_string()],
            metrics,
        };
        assert!(build(&[too_many_metrics], None).is_err());

        let no_metrics = ReportDefinition::new("empty", &["ga:date"], &[]);
        assert!(build(&[no_metrics], None).is_err());

        let no_dimensions = ReportDefinition::new("flat", &[], &["ga:sessions"]);
        assert!(build(&[no_dimensions], None).is_err());
    }

    #[test]
    fn test_segment_requires_segment_dimension() {
        assert!(build(&[traffic()], Some("gaid::-1")).is_err());

        let segmented = ReportDefinition::new("segmented", &["ga:date", "ga:segment"], &["ga:users"]);
        assert!(build(&[segmented.clone()], Some("gaid::-1")).is_ok());
        assert!(build(&[segmented], None).is_ok());
    }

    #[test]
    fn test_rejects_colliding_output_names() {
        let colliding = ReportDefinition::new("clash", &["ga:source", "ga_source"], &["ga:users"]);
        assert!(build(&[colliding], None).is_err());
    }

    #[test]
    fn test_singer_catalog_shape() {
        let catalog = build(&[traffic()], None).unwrap();
        let json = catalog.to_singer_json();
        let stream = &json["streams"][0];

        assert_eq!(stream["tap_stream_id"], "traffic");
        assert_eq!(stream["key_properties"][0], "_sdc_record_hash");
        assert_eq!(
            stream["schema"]["properties"]["ga_sessions"]["type"],
            serde_json::json!(["null", "integer"])
        );
        assert_eq!(stream["schema"]["properties"]["ga_date"]["format"], "date");
        assert_eq!(stream["metadata"][0]["metadata"]["replication-key"], RECORD_TIMESTAMP);
        assert_eq!(stream["metadata"][1]["metadata"]["ga_type"], "dimension");
        assert_eq!(stream["metadata"][1]["metadata"]["ga_name"], "ga:date");
    }
}
