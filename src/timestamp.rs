use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Start time of a run, shared read-only by every worker.
#[derive(Debug, Clone, Copy)]
pub struct RunClock {
    started: Instant,
    started_at: SystemTime,
    limit: Option<Duration>,
}

impl RunClock {
    pub fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            started_at: SystemTime::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// `None` when unlimited, or when the limit lies beyond what `Instant` can represent.
    pub fn deadline(&self) -> Option<Instant> {
        self.limit.and_then(|limit| self.started.checked_add(limit))
    }

    pub fn expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }
}

/// Seconds as a float, the unit every reported timing uses.
pub fn secs(d: Duration) -> f64 {
    d.as_secs_f64()
}
