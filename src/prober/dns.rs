use crate::config::DnsBackend;
use crate::error::{ProbeError, timed_out};
use std::net::IpAddr;
use tokio::time::{Duration, timeout};
use tracing::warn;
use trust_dns_resolver::TokioAsyncResolver;

pub enum Resolver {
    System,
    TrustDns(TokioAsyncResolver),
}

impl Resolver {
    pub fn new(backend: DnsBackend) -> Self {
        match backend {
            DnsBackend::System => Resolver::System,
            DnsBackend::TrustDns => match TokioAsyncResolver::tokio_from_system_conf() {
                Ok(resolver) => Resolver::TrustDns(resolver),
                Err(e) => {
                    warn!("trust-dns unavailable ({}), using system resolver", e);
                    Resolver::System
                }
            },
        }
    }

    /// Resolve `host` to one address, preferring IPv4.
    pub async fn resolve(&self, host: &str, limit: Duration) -> Result<IpAddr, ProbeError> {
        // IP literals need no lookup
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs = match timeout(limit, self.lookup(host)).await {
            Ok(res) => res?,
            Err(_) => return Err(ProbeError::resolution(host, timed_out(limit))),
        };
        prefer_v4(addrs).ok_or_else(|| ProbeError::resolution(host, "no addresses returned"))
    }

    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        match self {
            Resolver::System => {
                let addrs = tokio::net::lookup_host((host, 0))
                    .await
                    .map_err(|e| ProbeError::resolution(host, e))?;
                Ok(addrs.map(|sa| sa.ip()).collect())
            }
            Resolver::TrustDns(resolver) => {
                let lookup = resolver
                    .lookup_ip(host)
                    .await
                    .map_err(|e| ProbeError::resolution(host, e))?;
                Ok(lookup.iter().collect())
            }
        }
    }
}

fn prefer_v4(addrs: Vec<IpAddr>) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}
