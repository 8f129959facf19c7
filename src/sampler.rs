//! Concurrent sampling of a timed operation.
//!
//! Every sample runs on its own task; outcomes come back over a channel so
//! the collecting side is the only writer of the [`SampleSet`].

use crate::error::ProbeError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed: Duration,
    /// Payload size, for samples that transfer data.
    pub bytes: Option<u64>,
}

impl Sample {
    pub fn timed(elapsed: Duration) -> Self {
        Self {
            elapsed,
            bytes: None,
        }
    }

    pub fn transfer(elapsed: Duration, bytes: u64) -> Self {
        Self {
            elapsed,
            bytes: Some(bytes),
        }
    }
}

pub type SampleOutcome = Result<Sample, ProbeError>;

/// Outcomes of one fan-out. Order carries no meaning.
#[derive(Debug, Default)]
pub struct SampleSet {
    requested: usize,
    outcomes: Vec<SampleOutcome>,
}

impl SampleSet {
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            outcomes: Vec::with_capacity(requested),
        }
    }

    pub fn push(&mut self, outcome: SampleOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Outcomes actually reported; less than `requested` only if a sample task died.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successes(&self) -> impl Iterator<Item = &Sample> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProbeError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    /// Arithmetic mean of the successful durations in seconds, `None` when
    /// nothing succeeded.
    pub fn mean_secs(&self) -> Option<f64> {
        let (count, total) = self
            .successes()
            .fold((0usize, 0f64), |(n, sum), s| (n + 1, sum + s.elapsed.as_secs_f64()));
        (count > 0).then(|| total / count as f64)
    }

    pub fn was_cancelled(&self) -> bool {
        self.failures().any(ProbeError::is_cancelled)
    }

    pub fn last_success(&self) -> Option<&Sample> {
        self.successes().last()
    }
}

/// Run `n` invocations of `op` concurrently and wait for every one of them,
/// failed or not, before returning.
///
/// `op` receives the sample index. `n` is validated as non-zero by the
/// configuration layer.
pub async fn fan_out<Op, Fut>(n: usize, op: Op) -> SampleSet
where
    Op: Fn(usize) -> Fut,
    Fut: Future<Output = SampleOutcome> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(n.max(1));

    for idx in 0..n {
        let tx = tx.clone();
        let sample = op(idx);
        tokio::spawn(async move {
            let outcome = sample.await;
            if let Err(e) = &outcome {
                debug!("sample {} failed: {}", idx, e);
            }
            // receiver lives until every sender is gone
            let _ = tx.send(outcome).await;
        });
    }
    drop(tx);

    let mut set = SampleSet::new(n);
    while let Some(outcome) = rx.recv().await {
        set.push(outcome);
    }

    if set.len() < n {
        warn!("{} of {} samples did not report", n - set.len(), n);
    }
    set
}
