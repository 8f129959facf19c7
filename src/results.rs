use crate::prober::HostProbeResult;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// Results keyed by hostname. Workers insert concurrently; each key is
/// written at most once.
#[derive(Debug, Default)]
pub struct ResultMap {
    inner: DashMap<String, HostProbeResult>,
}

impl ResultMap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: DashMap::with_capacity(capacity),
        }
    }

    /// Store `result` under its hostname. A second write for the same key is
    /// refused and reported as `false`.
    pub fn insert(&self, result: HostProbeResult) -> bool {
        match self.inner.entry(result.hostname.clone()) {
            Entry::Occupied(_) => {
                warn!("result for {} already stored, keeping the first", result.hostname);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
        }
    }

    /// Drain into a list ordered like `hosts`; hosts without a result are
    /// skipped.
    pub fn take_ordered(&self, hosts: &[String]) -> Vec<HostProbeResult> {
        hosts
            .iter()
            .filter_map(|h| self.inner.remove(h).map(|(_, res)| res))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    /// The run deadline fired before every host was fully probed.
    Truncated {
        /// Hosts without a result: never taken off the queue, or taken by a
        /// worker that was aborted after the shutdown grace period.
        pending: usize,
        /// Hosts whose probe was cut short; their partial results are kept.
        interrupted: usize,
    },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    /// One entry per distinct hostname processed, in input order.
    pub results: Vec<HostProbeResult>,
    pub status: RunStatus,
    pub elapsed: Duration,
    pub started_at: SystemTime,
    pub duplicates_skipped: usize,
}

impl RunReport {
    pub fn is_truncated(&self) -> bool {
        matches!(self.status, RunStatus::Truncated { .. })
    }

    #[cfg(test)]
    pub fn get(&self, hostname: &str) -> Option<&HostProbeResult> {
        self.results.iter().find(|r| r.hostname == hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_write_for_a_key_is_refused() {
        let map = ResultMap::default();
        let mut first = HostProbeResult::new("a.test");
        first.redirect_count = 1;
        assert!(map.insert(first));

        let mut second = HostProbeResult::new("a.test");
        second.redirect_count = 2;
        assert!(!map.insert(second));

        let out = map.take_ordered(&["a.test".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].redirect_count, 1);
    }

    #[test]
    fn take_ordered_follows_input_order_and_skips_missing() {
        let map = ResultMap::with_capacity(3);
        for h in ["c", "a", "b"] {
            map.insert(HostProbeResult::new(h));
        }
        let order: Vec<String> = ["a", "missing", "b", "c"].iter().map(|s| s.to_string()).collect();
        let names: Vec<String> = map.take_ordered(&order).into_iter().map(|r| r.hostname).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(map.is_empty());
    }

    #[test]
    fn concurrent_inserts_from_many_threads() {
        let map = std::sync::Arc::new(ResultMap::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        assert!(map.insert(HostProbeResult::new(&format!("h{t}-{i}"))));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(map.len(), 800);
    }
}
