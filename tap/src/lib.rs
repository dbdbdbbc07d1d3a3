pub mod catalog;
pub mod client;
pub mod executor;
pub mod logging;
pub mod models;
pub mod output;
pub mod planner;
pub mod reports;
pub mod state;
pub mod sync;
pub mod transform;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use sync::{StreamReport, StreamStatus, SyncCoordinator, SyncOptions, SyncSummary};

use chrono::Utc;
use client::{CredentialProvider, GaReportingClient, OAuthRefreshProvider, StaticTokenProvider};
use common::config::Settings;
use common::{Error, Result};
use output::SingerWriter;
use state::{Bookmarks, JsonFileStateSink, StateSink};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Print the catalog for the configured report definitions.
pub fn run_discover(settings: &Settings) -> Result<()> {
    let definitions = reports::load(settings.reports.as_deref())?;
    let catalog = catalog::build(&definitions, settings.segment_id.as_deref())?;

    info!(streams = catalog.len(), "Discovered streams");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &catalog.to_singer_json())?;
    writeln!(out)?;
    Ok(())
}

/// Run a full sync, writing messages to stdout.
///
/// Bookmarks come from `state_file` when configured; otherwise from
/// `state_path` (the `--state` input), with progress reported as `STATE`
/// messages. With `catalog_path`, the streams and their fields come from
/// that catalog and only its selected streams are synced.
pub async fn run_sync(
    settings: &Settings,
    state_path: Option<&str>,
    catalog_path: Option<&str>,
) -> Result<SyncSummary> {
    let mut options = SyncOptions::from_settings(settings, Utc::now().date_naive())?;
    let definitions = match catalog_path {
        Some(path) => {
            let selection = reports::load_catalog(path)?;
            options.selected_streams = Some(selection.selected);
            selection.definitions
        }
        None => reports::load(settings.reports.as_deref())?,
    };

    let http = rquest::Client::builder()
        .timeout(Duration::from_secs(settings.api.timeout_secs))
        .build()?;
    let credentials = credential_provider(settings, &http)?;
    let client = Arc::new(GaReportingClient::new(
        http,
        credentials,
        &settings.api,
        settings.quota_user.as_deref(),
    )?);

    let (writer, state): (Arc<SingerWriter<_>>, Arc<dyn StateSink>) =
        match state_source(non_blank(&settings.state_file), state_path) {
            StateSource::File(path) => (
                Arc::new(SingerWriter::new(std::io::stdout(), Bookmarks::new())),
                Arc::new(JsonFileStateSink::new(path)) as Arc<dyn StateSink>,
            ),
            StateSource::Input(path) => {
                let initial = match path {
                    Some(path) => Bookmarks::load_file(path)?,
                    None => Bookmarks::new(),
                };
                let writer = Arc::new(SingerWriter::new(std::io::stdout(), initial));
                (writer.clone(), writer as Arc<dyn StateSink>)
            }
        };
    let bookmarks = state.load().await?;

    SyncCoordinator::new(client, writer, state)
        .sync(&definitions, &options, bookmarks)
        .await
}

#[derive(Debug, PartialEq, Eq)]
enum StateSource<'a> {
    /// Bookmarks live in the configured `state_file`.
    File(&'a str),
    /// Bookmarks are read from `--state` and reported as `STATE` messages.
    Input(Option<&'a str>),
}

/// A configured `state_file` takes precedence over `--state`.
fn state_source<'a>(state_file: Option<&'a str>, state_path: Option<&'a str>) -> StateSource<'a> {
    match (state_file, state_path) {
        (Some(file), Some(ignored)) => {
            warn!(
                state_file = file,
                state = ignored,
                "Both state_file and --state given; ignoring --state"
            );
            StateSource::File(file)
        }
        (Some(file), None) => StateSource::File(file),
        (None, path) => StateSource::Input(path),
    }
}

/// A refresh token with client credentials wins over a bare access token.
fn credential_provider(
    settings: &Settings,
    http: &rquest::Client,
) -> Result<Arc<dyn CredentialProvider>> {
    let Some(credentials) = settings.oauth_credentials.as_ref() else {
        return Err(Error::invalid_config("oauth_credentials are required"));
    };

    let provider: Arc<dyn CredentialProvider> = match (
        non_blank(&credentials.refresh_token),
        non_blank(&credentials.client_id),
        non_blank(&credentials.client_secret),
        non_blank(&credentials.access_token),
    ) {
        (Some(refresh_token), Some(client_id), Some(client_secret), _) => {
            Arc::new(OAuthRefreshProvider::new(
                http.clone(),
                &settings.api.token_uri,
                client_id,
                client_secret,
                refresh_token,
            ))
        }
        (_, _, _, Some(access_token)) => Arc::new(StaticTokenProvider::new(access_token)),
        _ => {
            return Err(Error::invalid_config(
                "oauth_credentials need either refresh_token, client_id and client_secret, or access_token",
            ));
        }
    };

    Ok(provider)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
