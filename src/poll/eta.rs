//! Two-point ETA estimation for long-running backend jobs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Completion estimate derived from two counter samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EtaEstimate {
    /// Insert rate in rows per second
    pub rate_per_sec: f64,
    /// Rows still missing
    pub remaining: u64,
    /// Estimated seconds until the target is reached
    pub eta_secs: f64,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    inserted: u64,
    at: DateTime<Utc>,
}

/// Estimates remaining time for jobs exposing a monotonically increasing
/// `inserted` counter and a fixed `target`.
///
/// The estimate is a plain linear extrapolation between the previous and the
/// current sample of the same job id, recomputed on every observation with no
/// smoothing. Any degenerate input (first sample for an id, zero or negative
/// elapsed time, zero or negative rate, unknown target, or progress already
/// at the target) yields `None` rather than a negative or infinite ETA.
#[derive(Debug, Default)]
pub struct ThroughputEstimator {
    samples: HashMap<String, Sample>,
}

impl ThroughputEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a counter sample for `id` and return the updated estimate.
    pub fn observe(
        &mut self,
        id: &str,
        inserted: u64,
        target: Option<u64>,
        at: DateTime<Utc>,
    ) -> Option<EtaEstimate> {
        let prev = self.samples.insert(id.to_string(), Sample { inserted, at })?;

        let elapsed = at.signed_duration_since(prev.at);
        let elapsed_secs = elapsed.num_milliseconds() as f64 / 1000.0;
        if elapsed_secs <= 0.0 {
            return None;
        }

        if inserted <= prev.inserted {
            return None;
        }
        let rate = (inserted - prev.inserted) as f64 / elapsed_secs;
        if rate <= 0.0 {
            return None;
        }

        let target = target?;
        if inserted >= target {
            return None;
        }

        let remaining = target - inserted;
        Some(EtaEstimate {
            rate_per_sec: rate,
            remaining,
            eta_secs: remaining as f64 / rate,
        })
    }

    /// Drop samples for job ids not in the latest fetch, so a task that
    /// disappears and later re-appears starts cold instead of interpolating
    /// across the gap.
    pub fn retain<F>(&mut self, mut live: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.samples.retain(|id, _| live(id));
    }

    /// Forget a single job id
    pub fn forget(&mut self, id: &str) {
        self.samples.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_first_sample_is_unknown() {
        let mut est = ThroughputEstimator::new();
        assert!(est.observe("run-1", 100, Some(1000), at(0)).is_none());
    }

    #[test]
    fn test_linear_extrapolation() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        let eta = est.observe("run-1", 150, Some(1000), at(10)).unwrap();

        assert!((eta.rate_per_sec - 5.0).abs() < 1e-9);
        assert_eq!(eta.remaining, 850);
        assert!((eta.eta_secs - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_target_is_unknown() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, None, at(0));
        assert!(est.observe("run-1", 150, None, at(10)).is_none());
    }

    #[test]
    fn test_no_progress_is_unknown() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        assert!(est.observe("run-1", 100, Some(1000), at(10)).is_none());
    }

    #[test]
    fn test_counter_regression_is_unknown() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        assert!(est.observe("run-1", 90, Some(1000), at(10)).is_none());
    }

    #[test]
    fn test_zero_elapsed_is_unknown() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        assert!(est.observe("run-1", 150, Some(1000), at(0)).is_none());
    }

    #[test]
    fn test_completed_is_unknown() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 900, Some(1000), at(0));
        assert!(est.observe("run-1", 1000, Some(1000), at(10)).is_none());
    }

    #[test]
    fn test_no_cross_task_interpolation() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        // Different task id: its first sample never yields an estimate
        assert!(est.observe("run-2", 150, Some(1000), at(10)).is_none());
    }

    #[test]
    fn test_retain_resets_departed_tasks() {
        let mut est = ThroughputEstimator::new();
        est.observe("run-1", 100, Some(1000), at(0));
        est.retain(|id| id != "run-1");

        // The task re-appears: treated as cold
        assert!(est.observe("run-1", 500, Some(1000), at(60)).is_none());
    }
}
