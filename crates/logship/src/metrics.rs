//! Delivery metrics accumulator.
//!
//! All pipeline outcomes are visible here and nowhere else: the
//! background flush path never surfaces errors to producers. Counters are
//! monotonic; `avg_latency_ms` is a rolling mean over the most recent
//! successful send latencies.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Number of latency samples retained for the rolling average.
const LATENCY_WINDOW: usize = 100;

/// A point-in-time copy of the client's delivery metrics.
///
/// Snapshots are independent of the live register: later pipeline
/// activity does not mutate a snapshot already handed out.
///
/// `breaker_trips` counts both breaker-open short-circuits and retry
/// loops whose failures opened the breaker, so a single logical outage
/// can contribute more than one trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Records delivered in a 2xx-acknowledged batch.
    pub logs_sent: u64,
    /// Records irreversibly discarded: buffer overflow, breaker
    /// short-circuit, retry exhaustion, or a cancelled explicit flush.
    pub logs_dropped: u64,
    /// Failed send attempts (non-2xx or transport failure).
    pub errors: u64,
    /// Retries performed after a failed attempt.
    pub retries: u64,
    /// Times a flush was abandoned or concluded with the breaker open.
    pub breaker_trips: u64,
    /// Mean latency of the last `<= 100` successful sends, in ms.
    pub avg_latency_ms: f64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    logs_sent: u64,
    logs_dropped: u64,
    errors: u64,
    retries: u64,
    breaker_trips: u64,
    latencies: VecDeque<f64>,
}

/// Thread-safe register behind the client's `metrics()` accessor.
///
/// When constructed disabled, every recording call is a no-op and
/// snapshots read all zeros.
#[derive(Debug)]
pub(crate) struct MetricsRegister {
    enabled: bool,
    inner: Mutex<MetricsInner>,
}

impl MetricsRegister {
    pub(crate) fn new(enabled: bool) -> Self {
        MetricsRegister {
            enabled,
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    pub(crate) fn add_sent(&self, n: u64) {
        if !self.enabled {
            return;
        }
        self.inner.lock().expect("lock poisoned").logs_sent += n;
    }

    pub(crate) fn add_dropped(&self, n: u64) {
        if !self.enabled {
            return;
        }
        self.inner.lock().expect("lock poisoned").logs_dropped += n;
    }

    pub(crate) fn incr_errors(&self) {
        if !self.enabled {
            return;
        }
        self.inner.lock().expect("lock poisoned").errors += 1;
    }

    pub(crate) fn incr_retries(&self) {
        if !self.enabled {
            return;
        }
        self.inner.lock().expect("lock poisoned").retries += 1;
    }

    pub(crate) fn incr_breaker_trips(&self) {
        if !self.enabled {
            return;
        }
        self.inner.lock().expect("lock poisoned").breaker_trips += 1;
    }

    pub(crate) fn record_latency(&self, latency_ms: f64) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.latencies.len() >= LATENCY_WINDOW {
            inner.latencies.pop_front();
        }
        inner.latencies.push_back(latency_ms);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().expect("lock poisoned");
        let avg_latency_ms = if inner.latencies.is_empty() {
            0.0
        } else {
            inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
        };
        MetricsSnapshot {
            logs_sent: inner.logs_sent,
            logs_dropped: inner.logs_dropped,
            errors: inner.errors,
            retries: inner.retries,
            breaker_trips: inner.breaker_trips,
            avg_latency_ms,
        }
    }

    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        *inner = MetricsInner::default();
    }
}
