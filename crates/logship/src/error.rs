//! Error types surfaced by the client.
//!
//! The background delivery pipeline never propagates send failures to
//! producers; those are visible only through the metrics counters. The
//! variants here cover the synchronous surface: construction, buffer
//! admission, explicit flush/query calls.

/// Errors returned by the client's public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Construction-time configuration problem (missing endpoint or API key,
    /// zero-valued sizing fields).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record was rejected before buffering (empty service name).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The buffer is at capacity; the offending record was dropped.
    #[error("log buffer is full")]
    BufferFull,

    /// The client has been closed; the record was not buffered.
    #[error("client is closed")]
    ClientClosed,

    /// A caller-supplied cancellation token fired during an explicit
    /// flush or query.
    #[error("operation cancelled")]
    Cancelled,

    /// The server answered a query with a non-2xx status, or the response
    /// body could not be decoded.
    #[error("api error (status {status}): {body}")]
    Api { status: u16, body: String },

    /// The HTTP request could not be completed at all.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Runtime misuse, e.g. constructing the client outside a tokio runtime.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
