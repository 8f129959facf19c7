mod cli;
mod config;
mod error;
mod metrics;
mod prober;
mod report;
mod results;
mod sampler;
mod scheduler;
mod shutdown;
mod timestamp;
mod util;

#[cfg(test)]
mod test_support;

use clap::Parser;
use cli::Cli;
use config::ProbeConfig;
use prober::{ProbeContext, probe_host};
use scheduler::Scheduler;

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Cli::parse();

    // Load config first to get log level
    let mut config = ProbeConfig::load(args.config.as_deref()).await?;
    args.apply(&mut config);
    config.validate()?;
    init_tracing(&config)?;

    let input = args.input.to_string_lossy().into_owned();
    let hostnames = util::read_host_list(&input).await?;
    info!("Starting webspeed with {} hosts from {}", hostnames.len(), input);

    let config = Arc::new(config);
    let ctx = Arc::new(ProbeContext::new(config.clone())?);
    let scheduler = Scheduler::from_config(&config)?;

    let report = scheduler
        .run(hostnames, move |host, shutdown| {
            let ctx = ctx.clone();
            async move { probe_host(&ctx, &host, &shutdown).await }
        })
        .await;

    if args.json {
        let path = args
            .output
            .clone()
            .unwrap_or_else(|| report::json_output_path(&args.input));
        tokio::fs::write(&path, report::render_json(&report)?).await?;
        info!("results written to {}", path.display());
    } else {
        print!("{}", report::render_text(&report));
    }

    if let Some(path) = &args.metrics_file {
        metrics::write_metrics(&report, path).await?;
        info!("metrics written to {}", path.display());
    }

    if report.is_truncated() {
        error!(
            "TimeoutExceeded: exceeded {}s, results are partial",
            config.run_timeout_secs
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing(config: &ProbeConfig) -> anyhow::Result<()> {
    let level = config.get_tracing_level()?;
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("webspeed={}", level.as_str().to_lowercase()).parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.json_logs() {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
