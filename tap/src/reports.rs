use crate::models::ReportDefinition;
use common::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

const DEFAULT_REPORT_DEFINITION: &str = include_str!("../defaults/default_report_definition.json");

/// Load report definitions from `path`, or the bundled set when `path` is `None`.
pub fn load(path: Option<&str>) -> Result<Vec<ReportDefinition>> {
    let (source, content) = match path {
        Some(path) => {
            let content = std::fs::read_to_string(Path::new(path)).map_err(|e| {
                Error::invalid_config(format!("failed to read report definitions {path}: {e}"))
            })?;
            (path, content)
        }
        None => ("bundled default", DEFAULT_REPORT_DEFINITION.to_string()),
    };

    let definitions = parse(&content)
        .map_err(|e| Error::invalid_config(format!("invalid report definitions in {source}: {e}")))?;

    debug!(source, reports = definitions.len(), "Loaded report definitions");
    Ok(definitions)
}

fn parse(content: &str) -> serde_json::Result<Vec<ReportDefinition>> {
    serde_json::from_str(content)
}

/// Definitions read back from a discovery catalog and the streams selected in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSelection {
    pub definitions: Vec<ReportDefinition>,
    pub selected: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    streams: Vec<CatalogStream>,
}

#[derive(Debug, Deserialize)]
struct CatalogStream {
    tap_stream_id: String,
    #[serde(default)]
    metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(default)]
    breadcrumb: Vec<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Load a catalog produced by discovery, possibly edited to select streams.
///
/// Field order follows the metadata entries. The API name comes from
/// `ga_name`, falling back to the property name itself.
pub fn load_catalog(path: &str) -> Result<CatalogSelection> {
    let content = std::fs::read_to_string(Path::new(path))
        .map_err(|e| Error::invalid_config(format!("failed to read catalog {path}: {e}")))?;
    let catalog: CatalogFile = serde_json::from_str(&content)
        .map_err(|e| Error::invalid_config(format!("invalid catalog in {path}: {e}")))?;

    let mut definitions = Vec::with_capacity(catalog.streams.len());
    let mut selected = BTreeSet::new();

    for stream in &catalog.streams {
        if is_selected(stream) {
            selected.insert(stream.tap_stream_id.clone());
        }
        definitions.push(definition_from_stream(stream));
    }

    debug!(
        path,
        streams = definitions.len(),
        selected = selected.len(),
        "Loaded catalog"
    );
    Ok(CatalogSelection {
        definitions,
        selected,
    })
}

/// An explicit `selected` flag wins; otherwise automatic streams are selected.
fn is_selected(stream: &CatalogStream) -> bool {
    let Some(entry) = stream.metadata.iter().find(|e| e.breadcrumb.is_empty()) else {
        return false;
    };

    match entry.metadata.get("selected").and_then(Value::as_bool) {
        Some(selected) => selected,
        None => entry.metadata.get("inclusion").and_then(Value::as_str) == Some("automatic"),
    }
}

fn definition_from_stream(stream: &CatalogStream) -> ReportDefinition {
    let mut definition = ReportDefinition {
        name: stream.tap_stream_id.clone(),
        dimensions: Vec::new(),
        metrics: Vec::new(),
    };

    for entry in &stream.metadata {
        let [kind, property] = entry.breadcrumb.as_slice() else {
            continue;
        };
        if kind != "properties" {
            continue;
        }

        let source = entry
            .metadata
            .get("ga_name")
            .and_then(Value::as_str)
            .unwrap_or(property)
            .to_string();

        match entry.metadata.get("ga_type").and_then(Value::as_str) {
            Some("dimension") => definition.dimensions.push(source),
            Some("metric") => definition.metrics.push(source),
            _ => {}
        }
    }

    definition
}
