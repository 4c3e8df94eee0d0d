//! Circuit breaker guarding outbound sends.
//!
//! The breaker counts consecutive failures and, once the threshold is
//! reached, short-circuits further attempts until the reset timeout has
//! elapsed. After the timeout it admits a single trial: success closes
//! the circuit fully, one failure reopens it immediately.
//!
//! State transitions:
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────> Open
//!     ^                                │ reset timeout elapsed
//!     │  success                       v
//!     └─────────────────────────── HalfOpen
//!                                      │ failure
//!                                      └──────> Open
//! ```
//!
//! The Open → HalfOpen promotion is lazy: it happens inside
//! [`CircuitBreaker::can_attempt`] and [`CircuitBreaker::state`] when the
//! timeout is observed to have elapsed, not on a timer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation; requests flow.
    Closed,
    /// Failing; requests are rejected.
    Open,
    /// Trial period; one request is admitted to probe recovery.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

/// Failure-counting state machine, all mutations serialized under one mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    ///
    /// `threshold` is the consecutive-failure count that opens the
    /// circuit; `reset_timeout` is how long it stays open before a trial
    /// request is admitted.
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            threshold,
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_at: None,
            }),
        }
    }

    /// Whether a request may be attempted right now.
    ///
    /// Promotes Open to HalfOpen first if the reset timeout has elapsed
    /// since the last failure.
    pub fn can_attempt(&self) -> bool {
        let mut inner = self.inner.lock().expect("lock poisoned");
        Self::maybe_promote(&mut inner, self.reset_timeout);
        inner.state != BreakerState::Open
    }

    /// Records a successful request: resets the failure count and closes
    /// the circuit, from any state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.failure_count = 0;
        inner.state = BreakerState::Closed;
    }

    /// Records a failed request. Opens the circuit once the consecutive
    /// failure count reaches the threshold; a failure during HalfOpen
    /// reopens immediately because the threshold was already met.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.failure_count += 1;
        inner.last_failure_at = Some(Instant::now());
        if inner.failure_count >= self.threshold {
            inner.state = BreakerState::Open;
        }
    }

    /// The current state, after the same lazy promotion as `can_attempt`.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("lock poisoned");
        Self::maybe_promote(&mut inner, self.reset_timeout);
        inner.state
    }

    fn maybe_promote(inner: &mut BreakerInner, reset_timeout: Duration) {
        if inner.state == BreakerState::Open {
            if let Some(at) = inner.last_failure_at {
                if at.elapsed() >= reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
    }
}
