use crate::prober::HostProbeResult;
use crate::results::{RunReport, RunStatus};
use serde::{Serialize, Serializer};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Plain-text report, one block per host in input order.
pub fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    for res in &report.results {
        let _ = writeln!(out, "{}", res.hostname);
        for (label, value) in text_fields(res) {
            let _ = writeln!(out, "{} : {}", label, value);
        }
        out.push('\n');
    }
    if let RunStatus::Truncated { pending, interrupted } = report.status {
        let _ = writeln!(
            out,
            "TimeoutExceeded: run stopped after {:.1}s, {} hosts not probed, {} interrupted",
            report.elapsed.as_secs_f64(),
            pending,
            interrupted
        );
    }
    out
}

fn text_fields(res: &HostProbeResult) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if !res.resolved_ip.is_empty() {
        fields.push(("DNS Time", res.dns_time_seconds.to_string()));
        fields.push(("IP of Domain", res.resolved_ip.clone()));
    }
    if let Some(t) = res.tcp_time_avg_seconds {
        fields.push(("Average TCP Time", t.to_string()));
    }
    if let Some(code) = res.http_status_code {
        fields.push(("HTTP Response Code", code.to_string()));
        fields.push(("Number of Redirects", res.redirect_count.to_string()));
    }
    if let Some(t) = res.content_load_time_avg_seconds {
        fields.push(("Average Content Load Time", t.to_string()));
    }
    if let Some(e) = &res.error {
        fields.push(("Error", e.to_string()));
    }
    fields
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    status: &'static str,
    /// Unix time the run started, in seconds.
    started_at: f64,
    elapsed_seconds: f64,
    pending_hosts: usize,
    interrupted_hosts: usize,
    duplicates_skipped: usize,
    #[serde(serialize_with = "by_hostname")]
    results: &'a [HostProbeResult],
}

/// Results as an object keyed by hostname, keeping input order.
fn by_hostname<S: Serializer>(results: &&[HostProbeResult], s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(results.iter().map(|r| (&r.hostname, r)))
}

pub fn render_json(report: &RunReport) -> serde_json::Result<String> {
    let (status, pending_hosts, interrupted_hosts) = match report.status {
        RunStatus::Complete => ("complete", 0, 0),
        RunStatus::Truncated { pending, interrupted } => ("truncated", pending, interrupted),
    };
    serde_json::to_string_pretty(&JsonReport {
        status,
        started_at: report
            .started_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64(),
        elapsed_seconds: report.elapsed.as_secs_f64(),
        pending_hosts,
        interrupted_hosts,
        duplicates_skipped: report.duplicates_skipped,
        results: &report.results,
    })
}

/// `hosts.txt` -> `hosts_results.json`, next to the input.
pub fn json_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "webspeed".to_string());
    input.with_file_name(format!("{stem}_results.json"))
}
