//! Reporting API collaborator: the seam the executor queries through.

mod auth;
mod ga;

pub use auth::{Credential, CredentialProvider, OAuthRefreshProvider, StaticTokenProvider};
pub use ga::GaReportingClient;

use crate::models::{DateWindow, ReportPage};
use async_trait::async_trait;
use common::Result;
use std::fmt;
use std::str::FromStr;

/// API-side accuracy/speed hint. Forwarded as requested, never verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingLevel {
    #[default]
    Default,
    Small,
    Large,
}

impl SamplingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingLevel::Default => "DEFAULT",
            SamplingLevel::Small => "SMALL",
            SamplingLevel::Large => "LARGE",
        }
    }
}

impl FromStr for SamplingLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(SamplingLevel::Default),
            "SMALL" => Ok(SamplingLevel::Small),
            "LARGE" => Ok(SamplingLevel::Large),
            other => Err(format!("unknown sampling level '{other}'")),
        }
    }
}

impl fmt::Display for SamplingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page request for a report window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub view_id: String,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub window: DateWindow,
    pub sampling_level: SamplingLevel,
    pub segment_id: Option<String>,
    pub page_token: Option<String>,
}

#[async_trait]
pub trait ReportingApiClient: Send + Sync {
    /// Fetch one page. Transient failures are retried here; an error means
    /// the retry budget is spent or the failure is not recoverable.
    async fn query(&self, query: &ReportQuery) -> Result<ReportPage>;
}
