use crate::config::ProbeConfig;
use crate::error::{ConfigError, ProbeError};
use crate::sampler::{SampleSet, fan_out};
use crate::shutdown::Shutdown;
use crate::timestamp::secs;
use crate::util::http_url;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub mod dns;
pub mod http;
pub mod tcp_connect;

use dns::Resolver;
use http::HttpProber;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SampleCounts {
    pub succeeded: usize,
    pub attempted: usize,
}

impl From<&SampleSet> for SampleCounts {
    fn from(set: &SampleSet) -> Self {
        Self {
            succeeded: set.success_count(),
            attempted: set.requested(),
        }
    }
}

/// Measurements for one hostname. Optional fields are absent when their step
/// was never reached or produced no successful sample.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostProbeResult {
    pub hostname: String,
    #[serde(rename = "resolvedIP")]
    pub resolved_ip: String,
    pub dns_time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_time_avg_seconds: Option<f64>,
    pub tcp_samples: SampleCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    pub redirect_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_load_time_avg_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_samples: Option<SampleCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
}

impl HostProbeResult {
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Default::default()
        }
    }

    fn failed(mut self, error: ProbeError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn was_interrupted(&self) -> bool {
        self.error.as_ref().is_some_and(ProbeError::is_cancelled)
    }
}

/// Everything a probe needs, built once per run and shared by all workers.
pub struct ProbeContext {
    config: Arc<ProbeConfig>,
    resolver: Resolver,
    http: HttpProber,
}

impl ProbeContext {
    pub fn new(config: Arc<ProbeConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            resolver: Resolver::new(config.dns_backend),
            http: HttpProber::new(&config)?,
            config,
        })
    }
}

/// DNS, then TCP samples, then HEAD with redirects, then content samples on a
/// 200. Errors end the probe early but never escape it; the record carries
/// whatever was measured up to that point.
pub async fn probe_host(ctx: &ProbeContext, hostname: &str, shutdown: &Shutdown) -> HostProbeResult {
    let result = HostProbeResult::new(hostname);
    let limit = ctx.config.op_timeout();
    let samples = ctx.config.sample_count;

    let start = Instant::now();
    let ip = match shutdown.guard(ctx.resolver.resolve(hostname, limit)).await {
        None => return result.failed(ProbeError::Cancelled),
        Some(Err(e)) => {
            debug!("{}: {}", hostname, e);
            return result.failed(e);
        }
        Some(Ok(ip)) => ip,
    };
    let mut result = HostProbeResult {
        resolved_ip: ip.to_string(),
        dns_time_seconds: secs(start.elapsed()),
        ..result
    };

    let addr = SocketAddr::new(ip, ctx.config.port);
    let tcp = fan_out(samples, |_| {
        let shutdown = shutdown.clone();
        async move {
            shutdown
                .guard(tcp_connect::probe_tcp(addr, limit))
                .await
                .unwrap_or(Err(ProbeError::Cancelled))
        }
    })
    .await;
    result.tcp_time_avg_seconds = tcp.mean_secs();
    result.tcp_samples = SampleCounts::from(&tcp);
    if tcp.was_cancelled() {
        return result.failed(ProbeError::Cancelled);
    }
    if let Some(e) = tcp.failures().last() {
        debug!("{}: {} of {} TCP samples failed, last: {}", hostname, tcp.len() - tcp.success_count(), samples, e);
    }

    let url = http_url(ip, ctx.config.port);
    let head = match shutdown
        .guard(ctx.http.head_with_redirects(&url, hostname, ip))
        .await
    {
        None => return result.failed(ProbeError::Cancelled),
        Some(Err(e)) => return result.failed(e),
        Some(Ok(head)) => head,
    };
    result.http_status_code = Some(head.status);
    result.redirect_count = head.redirects;
    result.final_url = Some(head.final_target.url.to_string());
    if head.status != 200 {
        return result;
    }

    let target = head.final_target;
    let content = fan_out(samples, |_| {
        let shutdown = shutdown.clone();
        let http = ctx.http.clone();
        let target = target.clone();
        async move {
            shutdown
                .guard(http.fetch_content(&target))
                .await
                .unwrap_or(Err(ProbeError::Cancelled))
        }
    })
    .await;
    result.content_load_time_avg_seconds = content.mean_secs();
    result.content_samples = Some(SampleCounts::from(&content));
    result.content_bytes = content.last_success().and_then(|s| s.bytes);
    if content.was_cancelled() {
        return result.failed(ProbeError::Cancelled);
    }
    if content.success_count() == 0 {
        if let Some(e) = content.failures().last() {
            warn!("{}: no content sample succeeded, last error: {}", hostname, e);
        }
    }

    result
}
