//! Poll loop metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll loop metrics
///
/// Thread-safe metrics collection for observability. Use
/// [`crate::ChangePoller::metrics`] to get a snapshot of current values.
#[derive(Default)]
pub struct PollerMetrics {
    /// Total change rows captured
    rows_captured: AtomicU64,
    /// Batches delivered to the queue
    batches_delivered: AtomicU64,
    /// Total poll cycles
    poll_cycles: AtomicU64,
    /// Cycles that produced no rows (skipped or empty fetch)
    empty_polls: AtomicU64,
    /// Total polling time in milliseconds
    total_poll_time_ms: AtomicU64,
    /// Last poll duration in milliseconds
    last_poll_duration_ms: AtomicU64,
}

impl PollerMetrics {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn record_poll(&self, duration: Duration, rows: usize) {
        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
        let ms = duration.as_millis() as u64;
        self.total_poll_time_ms.fetch_add(ms, Ordering::Relaxed);
        self.last_poll_duration_ms.store(ms, Ordering::Relaxed);
        if rows == 0 {
            self.empty_polls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rows_captured.fetch_add(rows as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_batch(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Export metrics snapshot
    pub fn snapshot(&self) -> PollerMetricsSnapshot {
        PollerMetricsSnapshot {
            rows_captured: self.rows_captured.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            avg_poll_time_ms: {
                let cycles = self.poll_cycles.load(Ordering::Relaxed);
                if cycles > 0 {
                    self.total_poll_time_ms.load(Ordering::Relaxed) / cycles
                } else {
                    0
                }
            },
            last_poll_duration_ms: self.last_poll_duration_ms.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot for external export
#[derive(Debug, Clone)]
pub struct PollerMetricsSnapshot {
    pub rows_captured: u64,
    pub batches_delivered: u64,
    pub poll_cycles: u64,
    pub empty_polls: u64,
    pub avg_poll_time_ms: u64,
    pub last_poll_duration_ms: u64,
}
