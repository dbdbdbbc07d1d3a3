use serde::{Deserialize, Serialize};

/// A user-declared report: one stream made of dimensions and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub name: String,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
}

impl ReportDefinition {
    pub fn new(name: &str, dimensions: &[&str], metrics: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
        }
    }
}
