use thiserror::Error;

pub mod config;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] rquest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Quota exceeded")]
    QuotaExceeded,

    #[error("Invalid report request: {0}")]
    InvalidArgument(String),

    #[error("Backend error (HTTP {0})")]
    Backend(u16),

    #[error("Gateway timeout")]
    GatewayTimeout,

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("State error: {0}")]
    State(String),

    #[error("{0}")]
    Other(String),
}

/// Where an error lands in the run's failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad settings or report definitions. Fatal before any sync starts.
    Config,
    /// Credentials could not be obtained or were rejected. Fatal for the run.
    Auth,
    /// The reporting API could not serve a window. Fails one stream only.
    Fetch,
    /// A single row had an unexpected shape. Skipped and counted.
    Data,
    /// Local I/O, serialization or state persistence failures. Fatal.
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ErrorKind::Config,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Http(_)
            | Error::RateLimit
            | Error::QuotaExceeded
            | Error::InvalidArgument(_)
            | Error::Backend(_)
            | Error::GatewayTimeout
            | Error::Fetch(_) => ErrorKind::Fetch,
            Error::Data(_) => ErrorKind::Data,
            Error::Io(_) | Error::Json(_) | Error::State(_) | Error::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Transient failures worth another attempt against the API.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimit | Error::QuotaExceeded | Error::GatewayTimeout => true,
            Error::Backend(status) => matches!(status, 500 | 503),
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }
}

/// A row value that could not be coerced to the type its schema declares.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("field '{field}' has invalid value '{value}': {reason}")]
pub struct DataError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl DataError {
    pub fn new(field: &str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
