// Host list parsing and URL helpers.

use crate::error::ConfigError;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

pub async fn read_host_list(path: &str) -> Result<Vec<String>, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::HostFile {
            path: path.to_string(),
            source,
        })?;
    let hosts = parse_host_list(&content);
    if hosts.is_empty() {
        return Err(ConfigError::EmptyHostList(path.to_string()));
    }
    Ok(hosts)
}

/// One hostname per line; blank lines and `#` comments are skipped.
pub fn parse_host_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Keep the first occurrence of each hostname, in input order.
/// Returns the distinct hosts and how many duplicates were dropped.
pub fn dedupe_hosts(hosts: Vec<String>) -> (Vec<String>, usize) {
    let total = hosts.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<String> = hosts
        .into_iter()
        .filter(|h| seen.insert(h.clone()))
        .collect();
    let dropped = total - unique.len();
    (unique, dropped)
}

/// `http://ip[:port]/`, with IPv6 bracketed and port 80 left implicit.
pub fn http_url(ip: IpAddr, port: u16) -> String {
    if port == 80 {
        match ip {
            IpAddr::V4(v4) => format!("http://{}/", v4),
            IpAddr::V6(v6) => format!("http://[{}]/", v6),
        }
    } else {
        format!("http://{}/", SocketAddr::new(ip, port))
    }
}
