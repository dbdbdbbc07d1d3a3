use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub view_id: String,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default = "default_date_batching")]
    pub date_batching: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_sampling_level")]
    pub sampling_level: String,
    #[serde(default)]
    pub segment_id: Option<String>,
    #[serde(default)]
    pub quota_user: Option<String>,
    /// Path to a JSON file with report definitions. The bundled default is used when unset.
    #[serde(default)]
    pub reports: Option<String>,
    /// When set, bookmarks are loaded from and persisted to this JSON file.
    #[serde(default)]
    pub state_file: Option<String>,
    #[serde(default)]
    pub oauth_credentials: Option<OAuthCredentials>,
    #[serde(default = "default_api_config")]
    pub api: ApiConfig,
    #[serde(default = "default_logging_config")]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OAuthCredentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_date_batching() -> String {
    "DAY".to_string()
}

fn default_lookback_days() -> i64 {
    15
}

fn default_sampling_level() -> String {
    "DEFAULT".to_string()
}

fn default_api_config() -> ApiConfig {
    ApiConfig {
        endpoint: default_api_endpoint(),
        token_uri: default_token_uri(),
        page_size: default_page_size(),
        max_retries: default_max_retries(),
        retry_base_delay_ms: default_retry_base_delay_ms(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_api_endpoint() -> String {
    "https://analyticsreporting.googleapis.com/v4/reports:batchGet".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_page_size() -> u32 {
    100_000
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("TAP").separator("__"));

        Self::from_config(builder.build()?)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut settings: Settings = config.try_deserialize()?;

        // Empty optional strings are treated as unset
        settings.end_date = settings.end_date.filter(|s| !s.trim().is_empty());
        settings.segment_id = settings.segment_id.filter(|s| !s.trim().is_empty());
        settings.quota_user = settings.quota_user.filter(|s| !s.trim().is_empty());
        settings.reports = settings.reports.filter(|s| !s.trim().is_empty());

        debug!(
            view_id = %settings.view_id,
            start_date = %settings.start_date,
            end_date = ?settings.end_date,
            date_batching = %settings.date_batching,
            "Loaded tap settings"
        );

        Ok(settings)
    }
}
