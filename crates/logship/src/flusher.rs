//! Batch delivery with retry and breaker protection.
//!
//! This is the final stage of the pipeline: a snapshot of buffered
//! records is serialized into the ingest envelope and POSTed to the
//! server, retrying transient failures with exponential backoff.
//!
//! ```text
//!   Buffer snapshot
//!        │
//!        v
//!   ┌────────────┐  open   ┌──────────────────┐
//!   │  Breaker?  │ ──────> │ Drop whole batch │
//!   └──────┬─────┘         └──────────────────┘
//!          │ closed / half-open
//!          v
//!   ┌────────────┐  2xx    ┌──────────────────┐
//!   │ HTTP POST  │ ──────> │ Record latency,  │
//!   └──────┬─────┘         │ count as sent    │
//!          │ non-2xx /     └──────────────────┘
//!          │ transport error
//!          v
//!   ┌────────────┐  retries left: sleep, double delay, loop
//!   │   Retry?   │
//!   └──────┬─────┘  exhausted: drop batch, count a trip if the
//!          v        breaker ended up open
//! ```
//!
//! Every outcome is recorded with the breaker and the metrics register.
//! Nothing here surfaces to producers; the only caller-visible error is
//! cancellation of an explicit flush.

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::error::Error;
use crate::metrics::MetricsRegister;
use crate::record::{IngestPayload, LogRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of a single send attempt.
enum AttemptError {
    Status(u16, String),
    Transport(reqwest::Error),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status(status, body) => write!(f, "status {status}: {body}"),
            AttemptError::Transport(err) => write!(f, "transport: {err}"),
        }
    }
}

/// Sends batches to the ingest endpoint, consulting the breaker before
/// every attempt and accounting every outcome in the metrics register.
#[derive(Debug)]
pub(crate) struct Flusher {
    http: reqwest::Client,
    ingest_url: String,
    max_retries: u32,
    initial_delay: Duration,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsRegister>,
    debug: bool,
}

impl Flusher {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: &str,
        max_retries: u32,
        initial_delay: Duration,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<MetricsRegister>,
        debug: bool,
    ) -> Self {
        Flusher {
            http,
            ingest_url: format!("{base_url}/api/v1/ingest"),
            max_retries,
            initial_delay,
            breaker,
            metrics,
            debug,
        }
    }

    /// Attempts to deliver one batch.
    ///
    /// Returns `Err` only for cancellation of an explicit flush; every
    /// delivery failure is absorbed into the metrics counters. When the
    /// loop gives up or is cancelled, the batch is gone and counted as
    /// dropped, so every record still resolves to sent-or-dropped
    /// exactly once.
    pub(crate) async fn send_batch(
        &self,
        batch: Vec<LogRecord>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len() as u64;
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            if !self.breaker.can_attempt() {
                warn!(count, "breaker open, dropping log batch");
                self.metrics.add_dropped(count);
                self.metrics.incr_breaker_trips();
                return Ok(());
            }

            let started = Instant::now();
            let outcome = match cancel {
                Some(token) => tokio::select! {
                    () = token.cancelled() => {
                        self.metrics.add_dropped(count);
                        return Err(Error::Cancelled);
                    }
                    outcome = self.attempt(&batch) => outcome,
                },
                None => self.attempt(&batch).await,
            };

            match outcome {
                Ok(()) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    self.breaker.record_success();
                    self.metrics.record_latency(latency_ms);
                    self.metrics.add_sent(count);
                    if self.debug {
                        debug!(count, latency_ms, "log batch delivered");
                    }
                    return Ok(());
                }
                Err(err) => {
                    self.breaker.record_failure();
                    self.metrics.incr_errors();
                    if self.debug {
                        debug!(attempt, %err, "log batch send failed");
                    }
                    if attempt < self.max_retries {
                        self.metrics.incr_retries();
                        match cancel {
                            Some(token) => tokio::select! {
                                () = token.cancelled() => {
                                    self.metrics.add_dropped(count);
                                    return Err(Error::Cancelled);
                                }
                                () = sleep(delay) => {}
                            },
                            None => sleep(delay).await,
                        }
                        delay *= 2;
                        attempt += 1;
                    } else {
                        warn!(count, attempts = attempt + 1, "giving up on log batch");
                        self.metrics.add_dropped(count);
                        if self.breaker.state() == BreakerState::Open {
                            self.metrics.incr_breaker_trips();
                        }
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn attempt(&self, batch: &[LogRecord]) -> Result<(), AttemptError> {
        let payload = IngestPayload { logs: batch };
        let response = self
            .http
            .post(&self.ingest_url)
            .json(&payload)
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Status(status.as_u16(), body))
    }
}
