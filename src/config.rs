use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Environment variable naming a JSON config file, used when `--config` is absent.
pub const CONFIG_ENV: &str = "WEBSPEED_CONFIG";

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DnsBackend {
    /// Operating system resolver (honors /etc/hosts).
    System,
    /// trust-dns resolver built from the system's resolv.conf.
    TrustDns,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_count")]
    pub worker_count: usize,
    #[serde(default = "default_count")]
    pub sample_count: usize,
    /// Whole-run deadline in seconds, 0 disables it.
    #[serde(default)]
    pub run_timeout_secs: u64,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Extra request headers as "Name: value".
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_dns_backend")]
    pub dns_backend: DnsBackend,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_count() -> usize {
    1
}

fn default_op_timeout_ms() -> u64 {
    10_000
}

fn default_port() -> u16 {
    80
}

fn default_max_redirects() -> usize {
    30 // same hop limit as python-requests
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_dns_backend() -> DnsBackend {
    DnsBackend::System
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            worker_count: default_count(),
            sample_count: default_count(),
            run_timeout_secs: 0,
            op_timeout_ms: default_op_timeout_ms(),
            port: default_port(),
            user_agent: None,
            headers: Vec::new(),
            max_redirects: default_max_redirects(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            dns_backend: default_dns_backend(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ProbeConfig {
    /// Load from `path`, or from the file named by `WEBSPEED_CONFIG`, or fall
    /// back to defaults when neither is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match path.or(from_env.as_deref()) {
            Some(file) => Self::load_file_config(file).await,
            None => Ok(Self::default()),
        }
    }

    async fn load_file_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            return Err(ConfigError::MissingConfigFile(file_path.display().to_string()).into());
        }

        let content = fs::read_to_string(file_path).await?;
        let config: ProbeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(ConfigError::InvalidLogLevel(self.log_level.clone())),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Reject settings the engine cannot run with. Called before any run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("worker_count", self.worker_count as u64),
            ("sample_count", self.sample_count as u64),
            ("op_timeout_ms", self.op_timeout_ms),
            ("max_redirects", self.max_redirects as u64),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::ZeroCount { field, value });
            }
        }

        self.get_tracing_level()?;
        if !matches!(self.log_format.to_lowercase().as_str(), "text" | "json") {
            return Err(ConfigError::InvalidLogFormat(self.log_format.clone()));
        }
        self.parsed_headers()?;
        Ok(())
    }

    /// Split the configured "Name: value" headers.
    pub fn parsed_headers(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.headers
            .iter()
            .map(|raw| {
                let (name, value) = raw
                    .split_once(':')
                    .ok_or_else(|| ConfigError::InvalidHeader(raw.clone()))?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(ConfigError::InvalidHeader(raw.clone()));
                }
                Ok((name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| concat!("webspeed/", env!("CARGO_PKG_VERSION")).to_string())
    }
}
