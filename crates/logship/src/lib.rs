//! # logship
//!
//! Client library for shipping structured logs to a LogShip ingestion
//! server. Applications hand records to a [`LogClient`]; the client
//! enriches them with global metadata and trace context, buffers them,
//! and delivers them in batches over HTTP with retries, a circuit
//! breaker and delivery metrics.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use logship::{ClientConfig, LogClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), logship::Error> {
//!     let client = LogClient::new(ClientConfig::new(
//!         "https://logs.example.com",
//!         "my-api-key",
//!     ))?;
//!
//!     client.info("checkout", "order placed", None)?;
//!
//!     // Batches flush on a timer and when the batch size is reached;
//!     // flush explicitly before shutdown.
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery semantics
//!
//! Buffered records live in memory only. The producer-facing API fails
//! fast on buffer overflow; everything past the buffer is fire-and-forget
//! and observable only through [`LogClient::metrics`]: every accepted
//! record eventually counts as sent or dropped, exactly once. Order is
//! preserved within a batch but not across batches.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![allow(clippy::module_name_repetitions)]

mod breaker;
mod buffer;
mod client;
mod config;
mod context;
mod error;
mod flusher;
mod level;
mod metrics;
mod query;
mod record;

pub use breaker::BreakerState;
pub use client::LogClient;
pub use config::ClientConfig;
pub use context::new_trace_id;
pub use error::{Error, Result};
pub use level::Level;
pub use metrics::MetricsSnapshot;
pub use query::{
    AggregatedStats, MessageCount, QueryOptions, QueryResponse, ServiceCount, StatsOptions,
    TimeseriesBucket,
};
pub use record::{ErrorDetails, LogRecord, Metadata};

// Re-exported so callers can hand cancellation tokens to flush and query
// operations without depending on tokio-util themselves.
pub use tokio_util::sync::CancellationToken;
