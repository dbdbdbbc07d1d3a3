use super::{CredentialProvider, ReportQuery, ReportingApiClient};
use crate::models::{RawRow, ReportPage};
use crate::utils::retry::retry_with_backoff;
use async_trait::async_trait;
use chrono::Utc;
use common::config::ApiConfig;
use common::{Error, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Analytics Reporting API v4 client speaking `reports:batchGet`.
pub struct GaReportingClient {
    http: rquest::Client,
    credentials: Arc<dyn CredentialProvider>,
    endpoint: Url,
    page_size: u32,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl GaReportingClient {
    pub fn new(
        http: rquest::Client,
        credentials: Arc<dyn CredentialProvider>,
        api: &ApiConfig,
        quota_user: Option<&str>,
    ) -> Result<Self> {
        let mut endpoint = Url::parse(&api.endpoint).map_err(|e| {
            Error::invalid_config(format!("invalid API endpoint '{}': {}", api.endpoint, e))
        })?;

        if let Some(quota_user) = quota_user {
            endpoint.query_pairs_mut().append_pair("quotaUser", quota_user);
        }

        Ok(Self {
            http,
            credentials,
            endpoint,
            page_size: api.page_size,
            max_retries: api.max_retries,
            retry_base_delay_ms: api.retry_base_delay_ms,
        })
    }

    async fn query_once(&self, query: &ReportQuery) -> Result<ReportPage> {
        let credential = self.credentials.authorize().await?;
        let body = serde_json::to_vec(&build_request_body(query, self.page_size))?;

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", credential.access_token))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let fetched_at = Utc::now();

        if !(200..300).contains(&status) {
            return Err(classify_error(status, &text));
        }

        let mut page = parse_response(&text)?;
        page.fetched_at = fetched_at;

        debug!(
            view_id = %query.view_id,
            window = %query.window,
            rows = page.rows.len(),
            has_next_page = page.next_page_token.is_some(),
            "Fetched report page"
        );

        Ok(page)
    }
}

#[async_trait]
impl ReportingApiClient for GaReportingClient {
    async fn query(&self, query: &ReportQuery) -> Result<ReportPage> {
        retry_with_backoff(self.max_retries, self.retry_base_delay_ms, move || {
            self.query_once(query)
        })
        .await
    }
}

fn build_request_body(query: &ReportQuery, page_size: u32) -> Value {
    let dimensions: Vec<Value> = query
        .dimensions
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();
    let metrics: Vec<Value> = query
        .metrics
        .iter()
        .map(|expression| json!({ "expression": expression }))
        .collect();

    let mut request = json!({
        "viewId": query.view_id,
        "dateRanges": [{
            "startDate": query.window.start.format("%Y-%m-%d").to_string(),
            "endDate": query.window.end.format("%Y-%m-%d").to_string(),
        }],
        "samplingLevel": query.sampling_level.as_str(),
        "pageSize": page_size.to_string(),
        "dimensions": dimensions,
        "metrics": metrics,
    });

    if let Some(token) = &query.page_token {
        request["pageToken"] = json!(token);
    }
    if let Some(segment_id) = &query.segment_id {
        request["segments"] = json!([{ "segmentId": segment_id }]);
    }

    json!({ "reportRequests": [request] })
}

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    #[serde(default)]
    data: ReportData,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportData {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    metrics: Vec<DateRangeValues>,
}

#[derive(Debug, Deserialize)]
struct DateRangeValues {
    #[serde(default)]
    values: Vec<String>,
}

fn parse_response(body: &str) -> Result<ReportPage> {
    let response: BatchGetResponse = serde_json::from_str(body)
        .map_err(|e| Error::Fetch(format!("malformed report response: {e}")))?;

    // One report is requested at a time
    let Some(report) = response.reports.into_iter().next() else {
        return Ok(ReportPage {
            rows: Vec::new(),
            next_page_token: None,
            fetched_at: Utc::now(),
        });
    };

    let rows = report
        .data
        .rows
        .into_iter()
        .map(|row| RawRow {
            dimensions: row.dimensions,
            // Only one date range is ever requested
            metrics: row
                .metrics
                .into_iter()
                .next()
                .map(|range| range.values)
                .unwrap_or_default(),
        })
        .collect();

    Ok(ReportPage {
        rows,
        next_page_token: report.next_page_token.filter(|t| !t.is_empty()),
        fetched_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: Option<String>,
}

fn classify_error(status: u16, body: &str) -> Error {
    let (message, reason) = match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed.error.errors.into_iter().find_map(|e| e.reason);
            (parsed.error.message, reason)
        }
        Err(_) => (body.to_string(), None),
    };

    match (status, reason.as_deref()) {
        (_, Some("userRateLimitExceeded" | "rateLimitExceeded")) | (429, _) => Error::RateLimit,
        (_, Some("quotaExceeded")) => Error::QuotaExceeded,
        (400, _) => Error::InvalidArgument(message),
        (401 | 403, _) => Error::Auth(format!("HTTP {status}: {message}")),
        (500 | 503, _) => Error::Backend(status),
        (504, _) => Error::GatewayTimeout,
        _ => Error::Fetch(format!("HTTP {status}: {message}")),
    }
}
