//! Log record data model and wire shape.
//!
//! A [`LogRecord`] is the unit the client buffers and ships. Its serde
//! derivation is the wire format: `snake_case` fields, `time` for the
//! timestamp, `metadata` omitted when empty and `trace_id` omitted when
//! absent. The ingest payload wraps records in a `{"logs": [...]}` envelope.

use crate::level::Level;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form record metadata: string keys to arbitrary JSON values.
pub type Metadata = HashMap<String, serde_json::Value>;

/// A single structured log record.
///
/// Records handed to the client may leave `time` empty and `trace_id`
/// unset; the facade fills the timestamp and resolves the trace id from
/// the client's trace context during enrichment. After enrichment every
/// field except `trace_id` and (allowed-empty) `metadata` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Name of the service emitting the record. Must be non-empty.
    pub service: String,
    /// Severity level.
    pub level: Level,
    /// Log message. May be empty.
    pub message: String,
    /// ISO-8601 UTC timestamp. Filled by the facade when left empty.
    #[serde(rename = "time", default)]
    pub timestamp: String,
    /// Additional context, merged with the client's global metadata on
    /// enrichment. Caller-provided keys always win.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: Metadata,
    /// Correlation id propagated with the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl LogRecord {
    /// Creates a record with an empty timestamp and no metadata. The
    /// facade stamps the timestamp at enqueue time.
    pub fn new(service: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            service: service.into(),
            level,
            message: message.into(),
            timestamp: String::new(),
            metadata: Metadata::new(),
            trace_id: None,
        }
    }

    /// Replaces the record's metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets an explicit trace id. An explicit id always wins over the
    /// client's trace context.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// The ingest request body: `{"logs": [record, ...]}`.
#[derive(Debug, Serialize)]
pub(crate) struct IngestPayload<'a> {
    pub logs: &'a [LogRecord],
}

/// The response envelope shared by the query endpoints that return records.
#[derive(Debug, Deserialize)]
pub(crate) struct LogsEnvelope {
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

/// Serialized form of an error value, stored under the metadata key
/// `"error"` by the `error_with`/`critical_with` helpers.
///
/// `cause` nests the serialization of the inner error, following the
/// `source()` chain. Chains deeper than [`MAX_CAUSE_DEPTH`] are truncated;
/// cyclic chains do not occur with well-behaved `Error` impls but the
/// guard keeps a pathological one from recursing forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error type name. Falls back to `"Error"` for type-erased causes.
    pub name: String,
    /// The error's display message.
    pub message: String,
    /// Stack or backtrace text, when the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// The serialized source error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetails>>,
}

const MAX_CAUSE_DEPTH: usize = 16;

impl ErrorDetails {
    /// Builds details from a typed error, walking its `source()` chain.
    ///
    /// The top-level name is the error's type name (last path segments);
    /// type-erased causes are named `"Error"` since Rust keeps no runtime
    /// type name for them.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        ErrorDetails {
            name: short_type_name::<E>(),
            message: err.to_string(),
            stack: None,
            cause: err.source().map(|s| Box::new(Self::from_dyn(s, 1))),
        }
    }

    /// Builds details with an explicit name, for callers constructing
    /// error context by hand.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorDetails {
            name: name.into(),
            message: message.into(),
            stack: None,
            cause: None,
        }
    }

    /// Attaches stack text.
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attaches a nested cause.
    #[must_use]
    pub fn with_cause(mut self, cause: ErrorDetails) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    fn from_dyn(err: &(dyn std::error::Error + 'static), depth: usize) -> Self {
        let cause = if depth < MAX_CAUSE_DEPTH {
            err.source().map(|s| Box::new(Self::from_dyn(s, depth + 1)))
        } else {
            None
        };
        ErrorDetails {
            name: "Error".to_string(),
            message: err.to_string(),
            stack: None,
            cause,
        }
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}
