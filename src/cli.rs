use crate::config::{DnsBackend, ProbeConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "webspeed")]
#[command(about = "Measure DNS, TCP, HTTP and content-load latency for a list of hosts")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, help = "Input file of hostnames, one per line")]
    pub input: PathBuf,

    #[arg(short = 't', long = "threads", help = "Number of hosts probed concurrently")]
    pub workers: Option<usize>,

    #[arg(short = 'o', long = "timeout", help = "Run timeout in seconds, 0 for none")]
    pub run_timeout: Option<u64>,

    #[arg(short, long, help = "Write results to a JSON file instead of stdout")]
    pub json: bool,

    #[arg(long, help = "JSON output path (default: <input>_results.json)")]
    pub output: Option<PathBuf>,

    #[arg(short, long, help = "Custom User-Agent for HTTP requests")]
    pub user_agent: Option<String>,

    #[arg(short = 'T', long = "tests", help = "Parallel samples per TCP and content measurement")]
    pub samples: Option<usize>,

    #[arg(short = 'H', long = "header", help = "Extra request header \"Name: value\", repeatable")]
    pub headers: Vec<String>,

    #[arg(long, help = "Port to probe")]
    pub port: Option<u16>,

    #[arg(long, help = "Timeout for each network operation in milliseconds")]
    pub op_timeout_ms: Option<u64>,

    #[arg(long, value_enum, help = "DNS resolver backend")]
    pub dns_backend: Option<DnsBackend>,

    #[arg(long, help = "Write Prometheus text-format metrics to this file")]
    pub metrics_file: Option<PathBuf>,

    #[arg(long, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    #[arg(long, help = "Log format (text, json)")]
    pub log_format: Option<String>,

    #[arg(long, help = "JSON configuration file (or set WEBSPEED_CONFIG)")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Command-line values win over the config file.
    pub fn apply(&self, config: &mut ProbeConfig) {
        if let Some(v) = self.workers {
            config.worker_count = v;
        }
        if let Some(v) = self.samples {
            config.sample_count = v;
        }
        if let Some(v) = self.run_timeout {
            config.run_timeout_secs = v;
        }
        if let Some(v) = &self.user_agent {
            config.user_agent = Some(v.clone());
        }
        config.headers.extend(self.headers.iter().cloned());
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.op_timeout_ms {
            config.op_timeout_ms = v;
        }
        if let Some(v) = self.dns_backend {
            config.dns_backend = v;
        }
        if let Some(v) = &self.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = &self.log_format {
            config.log_format = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_match_the_classic_tool() {
        let cli = Cli::try_parse_from([
            "webspeed", "-i", "hosts.txt", "-t", "8", "-o", "60", "-j", "-u", "probe/1.0", "-T", "5",
        ])
        .unwrap();

        let mut cfg = ProbeConfig::default();
        cli.apply(&mut cfg);

        assert!(cli.json);
        assert_eq!(cli.input, PathBuf::from("hosts.txt"));
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.run_timeout_secs, 60);
        assert_eq!(cfg.sample_count, 5);
        assert_eq!(cfg.user_agent.as_deref(), Some("probe/1.0"));
    }

    #[test]
    fn unset_flags_keep_file_values() {
        let cli = Cli::try_parse_from([
            "webspeed", "--input", "h", "-H", "Accept: */*", "--dns-backend", "trust-dns",
        ])
        .unwrap();
        let mut cfg = ProbeConfig {
            worker_count: 4,
            headers: vec!["X-A: 1".into()],
            ..Default::default()
        };
        cli.apply(&mut cfg);

        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.headers, vec!["X-A: 1", "Accept: */*"]);
        assert_eq!(cfg.dns_backend, DnsBackend::TrustDns);
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["webspeed", "-t", "2"]).is_err());
    }
}
