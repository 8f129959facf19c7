use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failure of one probe step or one sample.
///
/// Stored on the host's result record, so it is cheap to clone and
/// serializes as a tagged object in the JSON report.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeError {
    #[error("DNS resolution failed for {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("TCP connect to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("content download from {url} failed: {reason}")]
    Content { url: String, reason: String },

    #[error("probe interrupted by run deadline")]
    Cancelled,
}

impl ProbeError {
    pub fn resolution(host: &str, reason: impl ToString) -> Self {
        ProbeError::Resolution {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn connect(addr: impl ToString, reason: impl ToString) -> Self {
        ProbeError::Connect {
            addr: addr.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn http(url: &str, reason: impl ToString) -> Self {
        ProbeError::Http {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn content(url: &str, reason: impl ToString) -> Self {
        ProbeError::Content {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProbeError::Cancelled)
    }
}

/// Reason string for an operation that hit the per-operation timeout.
pub fn timed_out(limit: Duration) -> String {
    format!("timed out after {:?}", limit)
}

/// Problems detected before a run is allowed to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be at least 1, got {value}")]
    ZeroCount { field: &'static str, value: u64 },

    #[error("invalid header {0:?}, expected \"Name: value\"")]
    InvalidHeader(String),

    #[error("invalid log level: {0}. Valid levels are: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}. Valid formats are: text, json")]
    InvalidLogFormat(String),

    #[error("cannot read host list {path}: {source}")]
    HostFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host list {0} contains no hostnames")]
    EmptyHostList(String),

    #[error("config file not found: {0}")]
    MissingConfigFile(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        ConfigError::HttpClient(err.to_string())
    }
}
