use crate::config::ProbeConfig;
use crate::error::ConfigError;
use crate::prober::HostProbeResult;
use crate::results::{ResultMap, RunReport, RunStatus};
use crate::shutdown::{self, Shutdown};
use crate::timestamp::RunClock;
use crate::util::dedupe_hosts;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout};
use tracing::{debug, error, info, warn};

type WorkQueue = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// Bounded pool of workers draining a queue of hostnames under an optional
/// whole-run deadline.
pub struct Scheduler {
    worker_count: usize,
    run_timeout: Option<Duration>,
    grace: Duration,
}

impl Scheduler {
    pub fn new(worker_count: usize, run_timeout: Option<Duration>, grace: Duration) -> Result<Self, ConfigError> {
        if worker_count == 0 {
            return Err(ConfigError::ZeroCount {
                field: "worker_count",
                value: 0,
            });
        }
        Ok(Self {
            worker_count,
            run_timeout,
            grace,
        })
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self, ConfigError> {
        Self::new(config.worker_count, config.run_timeout(), config.shutdown_grace())
    }

    /// job: probe for one hostname, given the run's shutdown signal
    ///
    /// Each distinct hostname is handed to `job` at most once; repeated
    /// entries in `hostnames` are skipped. When the deadline fires, workers
    /// stop taking hosts, in-flight jobs get `grace` to wind down and are
    /// aborted after that.
    pub async fn run<J, F>(&self, hostnames: Vec<String>, job: J) -> RunReport
    where
        J: Fn(String, Shutdown) -> F + Send + Sync + 'static,
        F: Future<Output = HostProbeResult> + Send + 'static,
    {
        let (hosts, duplicates_skipped) = dedupe_hosts(hostnames);
        if duplicates_skipped > 0 {
            warn!("skipping {} duplicate hostnames", duplicates_skipped);
        }

        let clock = RunClock::start(self.run_timeout);
        let results = Arc::new(ResultMap::with_capacity(hosts.len()));
        let (trigger, shutdown) = shutdown::channel();

        // seed and close: workers stop once the queue is drained
        let (tx, rx) = mpsc::unbounded_channel();
        for host in &hosts {
            if tx.send(host.clone()).is_err() {
                break;
            }
        }
        drop(tx);
        let queue: WorkQueue = Arc::new(Mutex::new(rx));

        info!(
            "probing {} hosts with {} workers, run timeout {:?}",
            hosts.len(),
            self.worker_count,
            self.run_timeout
        );

        let job = Arc::new(job);
        let mut workers = JoinSet::new();
        for id in 0..self.worker_count {
            let worker = Worker {
                id,
                queue: queue.clone(),
                results: results.clone(),
                shutdown: shutdown.clone(),
                clock,
            };
            workers.spawn(worker.run(job.clone()));
        }

        let deadline = async {
            match clock.deadline() {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        let finished = tokio::select! {
            _ = drain(&mut workers) => true,
            _ = deadline => false,
        };
        if !finished {
            error!("run timeout of {:?} reached, stopping workers", self.run_timeout.unwrap_or_default());
            trigger.fire();
            if timeout(self.grace, drain(&mut workers)).await.is_err() {
                warn!("workers still busy after {:?} grace, aborting them", self.grace);
                workers.abort_all();
                drain(&mut workers).await;
            }
        }

        let results = results.take_ordered(&hosts);
        let interrupted = results.iter().filter(|r| r.was_interrupted()).count();
        let pending = hosts.len() - results.len();
        let status = if pending > 0 || interrupted > 0 {
            RunStatus::Truncated { pending, interrupted }
        } else {
            RunStatus::Complete
        };

        let elapsed = clock.elapsed();
        info!("run finished in {:?}: {} results, {:?}", elapsed, results.len(), status);
        RunReport {
            results,
            status,
            elapsed,
            started_at: clock.started_at(),
            duplicates_skipped,
        }
    }
}

async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("worker task panicked: {}", e);
            }
        }
    }
}

struct Worker {
    id: usize,
    queue: WorkQueue,
    results: Arc<ResultMap>,
    shutdown: Shutdown,
    clock: RunClock,
}

impl Worker {
    async fn run<J, F>(self, job: Arc<J>)
    where
        J: Fn(String, Shutdown) -> F,
        F: Future<Output = HostProbeResult>,
    {
        debug!("worker {} started", self.id);
        loop {
            if self.shutdown.is_triggered() || self.clock.expired() {
                debug!("worker {} stopping at run deadline", self.id);
                break;
            }

            let next = {
                let mut rx = self.queue.lock().await;
                self.shutdown.guard(rx.recv()).await
            };
            let host = match next {
                Some(Some(host)) => host,
                Some(None) | None => break,
            };

            debug!("worker {} probing {}", self.id, host);
            let result = (*job)(host, self.shutdown.clone()).await;
            log_result(&result);
            self.results.insert(result);
        }
        debug!("worker {} stopped", self.id);
    }
}

fn log_result(result: &HostProbeResult) {
    match &result.error {
        Some(e) if e.is_cancelled() => warn!("{} interrupted: {}", result.hostname, e),
        Some(e) => warn!("{} failed: {}", result.hostname, e),
        None => info!(
            "{} ({}) dns={:.4}s tcp={:?} status={:?} redirects={} content={:?}",
            result.hostname,
            result.resolved_ip,
            result.dns_time_seconds,
            result.tcp_time_avg_seconds,
            result.http_status_code,
            result.redirect_count,
            result.content_load_time_avg_seconds
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Instant, sleep};

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn instant_probe(host: String, _: Shutdown) -> impl Future<Output = HostProbeResult> {
        async move {
            let mut res = HostProbeResult::new(&host);
            res.http_status_code = Some(200);
            res
        }
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(Scheduler::new(0, None, Duration::from_secs(1)).is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn every_host_gets_exactly_one_entry() {
        let scheduler = Scheduler::new(3, None, Duration::from_secs(1)).unwrap();
        let input = hosts(&["a", "b", "c", "d", "e", "f", "g"]);

        let report = scheduler.run(input.clone(), instant_probe).await;

        assert_eq!(report.status, RunStatus::Complete);
        assert!(!report.is_truncated());
        let names: Vec<_> = report.results.iter().map(|r| r.hostname.clone()).collect();
        assert_eq!(names, input);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicates_are_probed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(2, None, Duration::from_secs(1)).unwrap();

        let counter = calls.clone();
        let report = scheduler
            .run(hosts(&["a", "b", "a", "c", "b", "a"]), move |host, shutdown| {
                counter.fetch_add(1, Ordering::SeqCst);
                instant_probe(host, shutdown)
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.duplicates_skipped, 3);
        assert_eq!(report.status, RunStatus::Complete);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn workers_run_in_parallel() {
        let scheduler = Scheduler::new(4, None, Duration::from_secs(1)).unwrap();
        let start = Instant::now();

        let report = scheduler
            .run(hosts(&["a", "b", "c", "d"]), |host, _| async move {
                sleep(Duration::from_millis(300)).await;
                HostProbeResult::new(&host)
            })
            .await;

        assert_eq!(report.results.len(), 4);
        // four 300ms probes on four workers, far from the 1.2s sequential time
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_truncates_the_run() {
        let scheduler = Scheduler::new(1, Some(Duration::from_secs(1)), Duration::from_millis(500)).unwrap();
        let start = Instant::now();

        let report = scheduler
            .run(hosts(&["a", "b", "c", "d", "e", "f"]), |host, shutdown| async move {
                let mut res = HostProbeResult::new(&host);
                if shutdown.guard(sleep(Duration::from_millis(400))).await.is_none() {
                    res.error = Some(ProbeError::Cancelled);
                }
                res
            })
            .await;

        assert!(start.elapsed() < Duration::from_millis(1000 + 500 + 300));
        assert!(report.is_truncated());
        assert!(report.results.len() < 6);
        match report.status {
            RunStatus::Truncated { pending, .. } => {
                assert_eq!(pending, 6 - report.results.len());
                assert!(pending > 0);
            }
            RunStatus::Complete => unreachable!(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stubborn_jobs_are_aborted_after_grace() {
        let scheduler = Scheduler::new(2, Some(Duration::from_millis(200)), Duration::from_millis(200)).unwrap();
        let start = Instant::now();

        // ignores the shutdown signal entirely
        let report = scheduler
            .run(hosts(&["a", "b", "c"]), |host, _| async move {
                sleep(Duration::from_secs(30)).await;
                HostProbeResult::new(&host)
            })
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(report.results.is_empty());
        assert_eq!(report.status, RunStatus::Truncated { pending: 3, interrupted: 0 });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn maximal_run_timeout_does_not_overflow() {
        let config = ProbeConfig {
            run_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let scheduler = Scheduler::from_config(&config).unwrap();
        let report = scheduler.run(hosts(&["a"]), instant_probe).await;
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.results.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deadline_after_completion_leaves_run_complete() {
        let scheduler = Scheduler::new(2, Some(Duration::from_secs(5)), Duration::from_secs(1)).unwrap();
        let report = scheduler.run(hosts(&["a", "b"]), instant_probe).await;
        assert_eq!(report.status, RunStatus::Complete);
        assert!(report.elapsed < Duration::from_secs(5));
    }
}
