use crate::error::ProbeError;
use crate::prober::HostProbeResult;
use crate::results::{RunReport, RunStatus};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::path::Path;

/// Prometheus view of one run, written as a textfile-collector file.
pub struct RunMetrics {
    registry: Registry,
    dns: GaugeVec,
    tcp: GaugeVec,
    content: GaugeVec,
    status: IntGaugeVec,
    redirects: IntGaugeVec,
    outcomes: IntCounterVec,
    run_duration: Gauge,
    truncated: IntGauge,
}

impl RunMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let dns = GaugeVec::new(
            Opts::new("webspeed_dns_seconds", "DNS resolution time in seconds"),
            &["host"],
        )?;
        let tcp = GaugeVec::new(
            Opts::new("webspeed_tcp_connect_seconds", "Average TCP connect time in seconds"),
            &["host"],
        )?;
        let content = GaugeVec::new(
            Opts::new("webspeed_content_load_seconds", "Average content download time in seconds"),
            &["host"],
        )?;
        let status = IntGaugeVec::new(
            Opts::new("webspeed_http_status_code", "Final HTTP status after redirects"),
            &["host"],
        )?;
        let redirects = IntGaugeVec::new(
            Opts::new("webspeed_redirects", "Number of redirects followed"),
            &["host"],
        )?;
        let outcomes = IntCounterVec::new(
            Opts::new("webspeed_probes_total", "Probed hosts by outcome"),
            &["outcome"],
        )?;
        let run_duration = Gauge::new("webspeed_run_duration_seconds", "Wall time of the run")?;
        let truncated = IntGauge::new("webspeed_run_truncated", "1 if the run deadline cut the run short")?;

        registry.register(Box::new(dns.clone()))?;
        registry.register(Box::new(tcp.clone()))?;
        registry.register(Box::new(content.clone()))?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(redirects.clone()))?;
        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(run_duration.clone()))?;
        registry.register(Box::new(truncated.clone()))?;

        Ok(Self {
            registry,
            dns,
            tcp,
            content,
            status,
            redirects,
            outcomes,
            run_duration,
            truncated,
        })
    }

    pub fn observe(&self, report: &RunReport) {
        for res in &report.results {
            self.observe_host(res);
        }
        self.run_duration.set(report.elapsed.as_secs_f64());
        self.truncated
            .set(matches!(report.status, RunStatus::Truncated { .. }) as i64);
    }

    fn observe_host(&self, res: &HostProbeResult) {
        let host = res.hostname.as_str();
        self.outcomes.with_label_values(&[outcome(res)]).inc();
        if res.resolved_ip.is_empty() {
            return;
        }

        self.dns.with_label_values(&[host]).set(res.dns_time_seconds);
        if let Some(t) = res.tcp_time_avg_seconds {
            self.tcp.with_label_values(&[host]).set(t);
        }
        if let Some(code) = res.http_status_code {
            self.status.with_label_values(&[host]).set(code as i64);
            self.redirects
                .with_label_values(&[host])
                .set(res.redirect_count as i64);
        }
        if let Some(t) = res.content_load_time_avg_seconds {
            self.content.with_label_values(&[host]).set(t);
        }
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&mf, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

fn outcome(res: &HostProbeResult) -> &'static str {
    match (&res.error, res.http_status_code) {
        (Some(ProbeError::Resolution { .. }), _) => "dns_error",
        (Some(ProbeError::Http { .. }), _) => "http_error",
        (Some(ProbeError::Cancelled), _) => "interrupted",
        (Some(_), _) => "error",
        (None, Some(200)) => "ok",
        (None, Some(_)) => "non_ok_status",
        (None, None) => "incomplete",
    }
}

pub async fn write_metrics(report: &RunReport, path: &Path) -> anyhow::Result<()> {
    let metrics = RunMetrics::new()?;
    metrics.observe(report);
    tokio::fs::write(path, metrics.encode()?).await?;
    Ok(())
}
