//! The public client facade.
//!
//! A [`LogClient`] owns the whole delivery pipeline:
//!
//! ```text
//!   log()/info()/error_with()...
//!        │  enrichment: timestamp, trace id, global metadata
//!        v
//!   ┌──────────┐  size threshold   ┌───────────────────┐
//!   │  Buffer  │ ────────────────> │ detached flush    │
//!   └────┬─────┘                   └───────────────────┘
//!        │  periodic timer / explicit flush()
//!        v
//!   snapshot ──> Flusher (retry + breaker) ──> POST /api/v1/ingest
//! ```
//!
//! Producers never block on delivery: the enqueue path takes the buffer
//! mutex briefly and returns; flushes triggered by the batch threshold
//! are spawned onto the runtime captured at construction. The background
//! pipeline reports all outcomes through the metrics register only.
//!
//! Cloning a `LogClient` is cheap and shares the pipeline.

use crate::breaker::{BreakerState, CircuitBreaker};
use crate::buffer::LogBuffer;
use crate::config::ClientConfig;
use crate::context::{new_trace_id, TraceContext};
use crate::error::Error;
use crate::flusher::Flusher;
use crate::level::Level;
use crate::metrics::{MetricsRegister, MetricsSnapshot};
use crate::query::{
    AggregatedStats, QueryOptions, QueryResponse, StatsOptions,
};
use crate::record::{ErrorDetails, LogRecord, Metadata};
use chrono::{SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Client for shipping structured logs to an ingestion server.
///
/// Construct one per endpoint and share it freely; it is `Clone` and all
/// methods take `&self`. Must be created inside a tokio runtime, which it
/// uses for the periodic flush task and threshold-triggered flushes.
#[derive(Clone)]
pub struct LogClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    base_url: String,
    http: reqwest::Client,
    buffer: LogBuffer,
    metrics: Arc<MetricsRegister>,
    breaker: Arc<CircuitBreaker>,
    trace: TraceContext,
    flusher: Flusher,
    disposed: AtomicBool,
    shutdown: CancellationToken,
    handle: tokio::runtime::Handle,
}

impl LogClient {
    /// Validates the configuration, builds the shared HTTP client and
    /// starts the periodic flush task.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;

        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Runtime("LogClient must be created within a tokio runtime".to_string())
        })?;

        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| {
            Error::InvalidConfig("api_key contains invalid header characters".to_string())
        })?;
        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", api_key);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .default_headers(headers)
            .build()?;

        let base_url = config.base_url();
        let metrics = Arc::new(MetricsRegister::new(config.enable_metrics));
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_threshold,
            Duration::from_millis(config.breaker_reset_ms),
        ));
        let flusher = Flusher::new(
            http.clone(),
            &base_url,
            config.max_retries,
            Duration::from_millis(config.retry_delay_ms),
            Arc::clone(&breaker),
            Arc::clone(&metrics),
            config.debug,
        );

        let inner = Arc::new(ClientInner {
            buffer: LogBuffer::new(config.max_buffer_size),
            base_url,
            http,
            metrics,
            breaker,
            trace: TraceContext::new(),
            flusher,
            disposed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            handle,
            config,
        });

        spawn_periodic_flush(&inner);

        Ok(LogClient { inner })
    }

    /// Enriches and buffers one record.
    ///
    /// Enrichment fills the timestamp when absent, resolves the trace id
    /// (explicit id on the record, else the client trace context, else a
    /// generated one when `auto_trace_id` is on) and merges the global
    /// metadata without overwriting caller-provided keys.
    ///
    /// Returns `BufferFull` when the buffer is at capacity; the record is
    /// dropped and counted. Never blocks on delivery: crossing the batch
    /// threshold schedules a detached flush.
    pub fn log(&self, mut record: LogRecord) -> Result<(), Error> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(Error::ClientClosed);
        }
        if record.service.trim().is_empty() {
            return Err(Error::InvalidRecord("service must not be empty".to_string()));
        }

        if record.timestamp.is_empty() {
            record.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        }
        if record.trace_id.is_none() {
            record.trace_id = self.inner.trace.get();
            if record.trace_id.is_none() && self.inner.config.auto_trace_id {
                record.trace_id = Some(new_trace_id());
            }
        }
        for (key, value) in &self.inner.config.global_metadata {
            record
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let new_len = self.inner.buffer.try_push(record).map_err(|err| {
            self.inner.metrics.add_dropped(1);
            err
        })?;

        if new_len >= self.inner.config.batch_size {
            if self.inner.config.debug {
                debug!(buffered = new_len, "batch threshold reached, scheduling flush");
            }
            let inner = Arc::clone(&self.inner);
            self.inner.handle.spawn(async move {
                let _ = inner.flush_once(None).await;
            });
        }
        Ok(())
    }

    /// Logs at [`Level::Debug`].
    pub fn debug(
        &self,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        self.log_with(Level::Debug, service, message, metadata)
    }

    /// Logs at [`Level::Info`].
    pub fn info(
        &self,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        self.log_with(Level::Info, service, message, metadata)
    }

    /// Logs at [`Level::Warn`].
    pub fn warn(
        &self,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        self.log_with(Level::Warn, service, message, metadata)
    }

    /// Logs at [`Level::Error`].
    pub fn error(
        &self,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        self.log_with(Level::Error, service, message, metadata)
    }

    /// Logs at [`Level::Critical`].
    pub fn critical(
        &self,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        self.log_with(Level::Critical, service, message, metadata)
    }

    /// Logs at [`Level::Error`] with the serialized error value under the
    /// metadata key `"error"`.
    pub fn error_with<E: std::error::Error>(
        &self,
        service: &str,
        message: &str,
        error: &E,
    ) -> Result<(), Error> {
        self.log_with(Level::Error, service, message, Some(error_metadata(error)))
    }

    /// Logs at [`Level::Critical`] with the serialized error value under
    /// the metadata key `"error"`.
    pub fn critical_with<E: std::error::Error>(
        &self,
        service: &str,
        message: &str,
        error: &E,
    ) -> Result<(), Error> {
        self.log_with(
            Level::Critical,
            service,
            message,
            Some(error_metadata(error)),
        )
    }

    fn log_with(
        &self,
        level: Level,
        service: &str,
        message: &str,
        metadata: Option<Metadata>,
    ) -> Result<(), Error> {
        let mut record = LogRecord::new(service, level, message);
        if let Some(metadata) = metadata {
            record.metadata = metadata;
        }
        self.log(record)
    }

    /// Sets the client's current trace id.
    pub fn set_trace_id(&self, trace_id: impl Into<String>) {
        self.inner.trace.set(trace_id);
    }

    /// Returns the client's current trace id.
    pub fn trace_id(&self) -> Option<String> {
        self.inner.trace.get()
    }

    /// Clears the client's current trace id.
    pub fn clear_trace_id(&self) {
        self.inner.trace.clear();
    }

    /// Runs `f` with `trace_id` installed, restoring the prior value on
    /// every exit path, including a panic inside `f`.
    ///
    /// The trace context is shared by all users of this client, so
    /// concurrent scoped overrides observe each other; callers needing
    /// isolation set the id on the record instead.
    pub fn with_trace_id<R>(&self, trace_id: impl Into<String>, f: impl FnOnce() -> R) -> R {
        self.inner.trace.with_trace_id(trace_id, f)
    }

    /// Runs `f` with a freshly generated trace id installed.
    pub fn with_new_trace_id<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.trace.with_new_trace_id(f)
    }

    /// A point-in-time copy of the delivery metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Zeroes all counters and clears the latency window.
    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    /// The breaker's current state.
    pub fn breaker_state(&self) -> BreakerState {
        self.inner.breaker.state()
    }

    /// Drains the buffer once and attempts delivery, waiting for the
    /// outcome. Delivery failures are absorbed into the metrics like any
    /// background flush; this only fails on cancellation (never, here).
    pub async fn flush(&self) -> Result<(), Error> {
        self.inner.flush_once(None).await
    }

    /// Like [`flush`](Self::flush), aborting with [`Error::Cancelled`]
    /// when the token fires. Cancellation does not restore the drained
    /// records; the abandoned snapshot counts toward `logs_dropped`.
    pub async fn flush_cancellable(&self, cancel: &CancellationToken) -> Result<(), Error> {
        self.inner.flush_once(Some(cancel)).await
    }

    /// Queries logs with the given filters.
    pub async fn query(&self, options: &QueryOptions) -> Result<QueryResponse, Error> {
        crate::query::query(&self.inner.http, &self.inner.base_url, options, None).await
    }

    /// Like [`query`](Self::query) with caller-supplied cancellation.
    pub async fn query_cancellable(
        &self,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, Error> {
        crate::query::query(&self.inner.http, &self.inner.base_url, options, Some(cancel)).await
    }

    /// Fetches all records that carry the given trace id.
    pub async fn logs_by_trace_id(&self, trace_id: &str) -> Result<Vec<LogRecord>, Error> {
        crate::query::logs_by_trace_id(&self.inner.http, &self.inner.base_url, trace_id, None)
            .await
    }

    /// Like [`logs_by_trace_id`](Self::logs_by_trace_id) with
    /// caller-supplied cancellation.
    pub async fn logs_by_trace_id_cancellable(
        &self,
        trace_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<LogRecord>, Error> {
        crate::query::logs_by_trace_id(
            &self.inner.http,
            &self.inner.base_url,
            trace_id,
            Some(cancel),
        )
        .await
    }

    /// Fetches aggregated log statistics.
    pub async fn aggregated_stats(&self, options: &StatsOptions) -> Result<AggregatedStats, Error> {
        crate::query::aggregated_stats(&self.inner.http, &self.inner.base_url, options, None).await
    }

    /// Like [`aggregated_stats`](Self::aggregated_stats) with
    /// caller-supplied cancellation.
    pub async fn aggregated_stats_cancellable(
        &self,
        options: &StatsOptions,
        cancel: &CancellationToken,
    ) -> Result<AggregatedStats, Error> {
        crate::query::aggregated_stats(
            &self.inner.http,
            &self.inner.base_url,
            options,
            Some(cancel),
        )
        .await
    }

    /// Stops the periodic task, performs one final flush and marks the
    /// client closed. Subsequent `log` calls fail with `ClientClosed`
    /// without buffering anything. Idempotent.
    pub async fn close(&self) -> Result<(), Error> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.shutdown.cancel();
        self.inner.flush_once(None).await
    }

    #[cfg(test)]
    fn buffered(&self) -> Vec<LogRecord> {
        self.inner.buffer.peek()
    }
}

impl ClientInner {
    async fn flush_once(&self, cancel: Option<&CancellationToken>) -> Result<(), Error> {
        let batch = self.buffer.drain();
        if batch.is_empty() {
            return Ok(());
        }
        self.flusher.send_batch(batch, cancel).await
    }
}

fn spawn_periodic_flush(inner: &Arc<ClientInner>) {
    let weak = Arc::downgrade(inner);
    let shutdown = inner.shutdown.clone();
    let period = Duration::from_millis(inner.config.flush_interval_ms);
    inner.handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so the loop
        // waits a full period before its first flush.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    let _ = inner.flush_once(None).await;
                }
            }
        }
    });
}

fn error_metadata<E: std::error::Error>(error: &E) -> Metadata {
    let details = ErrorDetails::from_error(error);
    let mut metadata = Metadata::new();
    metadata.insert(
        "error".to_string(),
        serde_json::to_value(&details).unwrap_or(serde_json::Value::Null),
    );
    metadata
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn test_config() -> ClientConfig {
        ClientConfig {
            // Long interval and large batch so nothing flushes by itself;
            // the endpoint is never contacted in these tests.
            flush_interval_ms: 60_000,
            batch_size: 1_000,
            ..ClientConfig::new("http://127.0.0.1:9/", "test-key")
        }
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let result = LogClient::new(ClientConfig::new("", "key"));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = LogClient::new(ClientConfig::new("http://localhost:1234", ""));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_log_stamps_timestamp() {
        let client = LogClient::new(test_config()).unwrap();
        client.info("svc", "hello", None).unwrap();

        let records = client.buffered();
        assert_eq!(records.len(), 1);
        assert!(!records[0].timestamp.is_empty());
        assert!(records[0].timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_log_keeps_caller_timestamp() {
        let client = LogClient::new(test_config()).unwrap();
        let mut record = LogRecord::new("svc", Level::Info, "hello");
        record.timestamp = "2026-01-05T12:00:00Z".to_string();
        client.log(record).unwrap();

        assert_eq!(client.buffered()[0].timestamp, "2026-01-05T12:00:00Z");
    }

    #[tokio::test]
    async fn test_log_rejects_empty_service() {
        let client = LogClient::new(test_config()).unwrap();
        let result = client.info("", "hello", None);
        assert!(matches!(result, Err(Error::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn test_global_metadata_never_overwrites_caller_keys() {
        let mut global = Metadata::new();
        global.insert("env".to_string(), json!("test"));
        global.insert("version".to_string(), json!("1.0"));
        let config = ClientConfig {
            global_metadata: global,
            ..test_config()
        };
        let client = LogClient::new(config).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("env".to_string(), json!("prod"));
        client.info("svc", "m", Some(metadata)).unwrap();

        let record = &client.buffered()[0];
        assert_eq!(record.metadata["env"], json!("prod"));
        assert_eq!(record.metadata["version"], json!("1.0"));
    }

    #[tokio::test]
    async fn test_trace_context_fills_missing_trace_id() {
        let client = LogClient::new(test_config()).unwrap();
        client.set_trace_id("ctx-trace");
        client.info("svc", "m", None).unwrap();

        assert_eq!(
            client.buffered()[0].trace_id,
            Some("ctx-trace".to_string())
        );
    }

    #[tokio::test]
    async fn test_explicit_record_trace_id_wins() {
        let client = LogClient::new(test_config()).unwrap();
        client.set_trace_id("ctx-trace");
        client
            .log(LogRecord::new("svc", Level::Info, "m").with_trace_id("explicit"))
            .unwrap();

        assert_eq!(client.buffered()[0].trace_id, Some("explicit".to_string()));
    }

    #[tokio::test]
    async fn test_auto_trace_id_generates_uuid() {
        let config = ClientConfig {
            auto_trace_id: true,
            ..test_config()
        };
        let client = LogClient::new(config).unwrap();
        client.info("svc", "m", None).unwrap();

        let trace_id = client.buffered()[0].trace_id.clone().unwrap();
        assert!(Uuid::parse_str(&trace_id).is_ok());
    }

    #[tokio::test]
    async fn test_no_trace_id_without_context_or_auto() {
        let client = LogClient::new(test_config()).unwrap();
        client.info("svc", "m", None).unwrap();
        assert_eq!(client.buffered()[0].trace_id, None);
    }

    #[tokio::test]
    async fn test_scoped_trace_id_on_client() {
        let client = LogClient::new(test_config()).unwrap();
        client.set_trace_id("A");

        client.with_trace_id("B", || {
            assert_eq!(client.trace_id(), Some("B".to_string()));
            client.info("svc", "inside", None).unwrap();
        });

        assert_eq!(client.trace_id(), Some("A".to_string()));
        assert_eq!(client.buffered()[0].trace_id, Some("B".to_string()));
    }

    #[tokio::test]
    async fn test_buffer_overflow_drops_record_and_counts() {
        let config = ClientConfig {
            max_buffer_size: 2,
            ..test_config()
        };
        let client = LogClient::new(config).unwrap();

        client.info("svc", "one", None).unwrap();
        client.info("svc", "two", None).unwrap();
        let result = client.info("svc", "three", None);

        assert!(matches!(result, Err(Error::BufferFull)));
        assert_eq!(client.buffered().len(), 2);
        assert_eq!(client.metrics().logs_dropped, 1);
    }

    #[tokio::test]
    async fn test_error_with_attaches_error_details() {
        let client = LogClient::new(test_config()).unwrap();
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        client.error_with("svc", "write failed", &io_err).unwrap();

        let record = &client.buffered()[0];
        assert_eq!(record.level, Level::Error);
        let error_value = &record.metadata["error"];
        assert_eq!(error_value["message"], "disk on fire");
        assert!(error_value["name"].is_string());
    }

    #[tokio::test]
    async fn test_level_helpers_set_levels() {
        let client = LogClient::new(test_config()).unwrap();
        client.debug("svc", "d", None).unwrap();
        client.warn("svc", "w", None).unwrap();
        client.critical("svc", "c", None).unwrap();

        let records = client.buffered();
        assert_eq!(records[0].level, Level::Debug);
        assert_eq!(records[1].level, Level::Warn);
        assert_eq!(records[2].level, Level::Critical);
    }

    #[tokio::test]
    async fn test_metrics_snapshot_is_independent() {
        let config = ClientConfig {
            max_buffer_size: 1,
            ..test_config()
        };
        let client = LogClient::new(config).unwrap();
        client.info("svc", "one", None).unwrap();
        let _ = client.info("svc", "two", None);

        let before = client.metrics();
        let _ = client.info("svc", "three", None);

        assert_eq!(before.logs_dropped, 1);
        assert_eq!(client.metrics().logs_dropped, 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_logging() {
        let client = LogClient::new(test_config()).unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();

        let result = client.info("svc", "late", None);
        assert!(matches!(result, Err(Error::ClientClosed)));
        assert!(client.buffered().is_empty());
    }
}
