//! Client configuration.
//!
//! Configuration is programmatic only: callers build a [`ClientConfig`]
//! struct, typically with struct-update syntax over [`ClientConfig::new`]
//! or `Default`. The struct is immutable once handed to the client.

use crate::error::Error;
use crate::record::Metadata;

/// Configuration for a [`LogClient`](crate::client::LogClient).
///
/// `endpoint` and `api_key` are required; everything else has a default.
///
/// ```
/// use logship::ClientConfig;
///
/// let config = ClientConfig {
///     batch_size: 50,
///     flush_interval_ms: 2_000,
///     ..ClientConfig::new("https://logs.example.com", "secret")
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the ingestion server. A trailing slash is stripped.
    pub endpoint: String,
    /// API key sent as `X-API-Key` on every request.
    pub api_key: String,
    /// Number of buffered records that triggers an immediate flush.
    pub batch_size: usize,
    /// Period of the background flush timer, in milliseconds.
    pub flush_interval_ms: u64,
    /// Hard capacity of the record buffer. Records arriving while the
    /// buffer is full are dropped and reported as `BufferFull`.
    pub max_buffer_size: usize,
    /// Retries after the initial send attempt before a batch is dropped.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles after each
    /// failed attempt, without cap.
    pub retry_delay_ms: u64,
    /// Consecutive failures that open the circuit breaker.
    pub breaker_threshold: u32,
    /// Time the breaker stays open before admitting a trial request,
    /// in milliseconds.
    pub breaker_reset_ms: u64,
    /// When false, the metrics register records nothing.
    pub enable_metrics: bool,
    /// Emit debug-level diagnostics from the pipeline.
    pub debug: bool,
    /// Metadata merged into every record. Caller-provided keys win.
    pub global_metadata: Metadata,
    /// Generate a trace id for records that have none and no trace
    /// context is set.
    pub auto_trace_id: bool,
    /// Timeout applied to every outbound HTTP request, in seconds.
    pub http_timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoint: String::new(),
            api_key: String::new(),
            batch_size: 100,
            flush_interval_ms: 5_000,
            max_buffer_size: 10_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
            breaker_threshold: 5,
            breaker_reset_ms: 30_000,
            enable_metrics: true,
            debug: false,
            global_metadata: Metadata::new(),
            auto_trace_id: false,
            http_timeout_seconds: 30,
        }
    }
}

impl ClientConfig {
    /// Builds a config with the two required fields set and defaults for
    /// the rest.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        ClientConfig {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            ..ClientConfig::default()
        }
    }

    /// Validates required fields and loop-gating numeric fields.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig("endpoint is required".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("api_key is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".to_string()));
        }
        if self.max_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "max_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "flush_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.breaker_threshold == 0 {
            return Err(Error::InvalidConfig(
                "breaker_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The endpoint with any trailing slashes removed.
    pub(crate) fn base_url(&self) -> String {
        self.endpoint.trim_end_matches('/').to_string()
    }
}
