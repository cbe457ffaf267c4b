// src/stats.rs
// Incrementally-updated usage statistics with bounded memory: counters
// plus a running sum, never the individual durations.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Default)]
struct Aggregate {
    sum_ms: u64,
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

/// Shared, process-wide statistics collector. All writes go through
/// [`Statistics::update`]; readers take an immutable snapshot via
/// [`Statistics::get_stats`] — never by aliasing the internal state.
#[derive(Default)]
pub struct Statistics {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    aggregate: Mutex<Aggregate>,
}

/// A point-in-time copy of the collector's counters, excluding the
/// internal running sum. `Serialize` so a host application can expose
/// it verbatim as a diagnostics/metrics JSON endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed transactional call. Invoked exactly once
    /// per call, including non-transactional pass-throughs and failed
    /// calls. `duration_ms` is floored at 1ms to avoid degenerate
    /// zero-duration samples on fast mocks. A no-op when `enabled` is
    /// false (the caller passes `GlobalConfig::enable_stats`).
    pub fn update(&self, duration_ms: u64, success: bool, enabled: bool) {
        if !enabled {
            return;
        }
        let duration_ms = duration_ms.max(1);

        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        let mut aggregate = self.aggregate.lock();
        aggregate.sum_ms += duration_ms;
        aggregate.min_ms = Some(aggregate.min_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        aggregate.max_ms = Some(aggregate.max_ms.map_or(duration_ms, |m| m.max(duration_ms)));
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let aggregate = self.aggregate.lock();
        let avg = if total > 0 {
            aggregate.sum_ms as f64 / total as f64
        } else {
            0.0
        };
        StatsSnapshot {
            total,
            succeeded,
            failed,
            avg_duration_ms: avg,
            min_duration_ms: aggregate.min_ms.unwrap_or(0),
            max_duration_ms: aggregate.max_ms.unwrap_or(0),
        }
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        *self.aggregate.lock() = Aggregate::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_collector_is_a_no_op() {
        let stats = Statistics::new();
        stats.update(100, true, false);
        let snapshot = stats.get_stats();
        assert_eq!(snapshot.total, 0);
    }

    #[test]
    fn tracks_min_avg_max_and_succeeded_plus_failed_equals_total() {
        let stats = Statistics::new();
        stats.update(10, true, true);
        stats.update(0, false, true); // floored to 1
        stats.update(50, true, true);

        let snapshot = stats.get_stats();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.succeeded + snapshot.failed, snapshot.total);
        assert_eq!(snapshot.min_duration_ms, 1);
        assert_eq!(snapshot.max_duration_ms, 50);
        assert!((snapshot.avg_duration_ms - (61.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_everything() {
        let stats = Statistics::new();
        stats.update(10, true, true);
        stats.reset();
        let snapshot = stats.get_stats();
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.min_duration_ms, 0);
        assert_eq!(snapshot.max_duration_ms, 0);
    }
}
