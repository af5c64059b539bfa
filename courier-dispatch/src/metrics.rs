//! Per-worker counters and their aggregation.
//!
//! The hot send path does two atomic increments and one timestamp push —
//! there is no event log. Aggregate numbers are computed on demand by
//! summing worker counters, which keeps `metrics()` reads off the send path
//! entirely.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Length of the trailing window used for the send-rate figure.
pub(crate) const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Counters owned by one worker.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    sent: AtomicU64,
    failed: AtomicU64,
    bounced: AtomicU64,
    /// Timestamps of recent sends, pruned to [`RATE_WINDOW`].
    recent: Mutex<VecDeque<Instant>>,
}

impl WorkerCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);

        let mut recent = self.recent.lock();
        let now = Instant::now();
        recent.push_back(now);
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) > RATE_WINDOW)
        {
            recent.pop_front();
        }
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bounced(&self) {
        self.bounced.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bounced(&self) -> u64 {
        self.bounced.load(Ordering::Relaxed)
    }

    /// Sends recorded inside the trailing window.
    #[must_use]
    pub fn sends_in_window(&self) -> usize {
        let mut recent = self.recent.lock();
        let now = Instant::now();
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) > RATE_WINDOW)
        {
            recent.pop_front();
        }
        recent.len()
    }
}

/// Pipeline-wide totals, derived by summing per-worker counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AggregateMetrics {
    /// Workers known to the orchestrator.
    pub workers: usize,
    /// Workers currently in a running/idle state.
    pub running: usize,
    pub sent: u64,
    pub failed: u64,
    pub bounced: u64,
    /// Sends per second over the trailing window.
    pub sends_per_sec: f64,
}

impl AggregateMetrics {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn add_window_count(&mut self, count: usize) {
        self.sends_per_sec += count as f64 / RATE_WINDOW.as_secs_f64();
    }
}
