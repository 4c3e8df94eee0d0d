//! Query pass-through to the server's read API.
//!
//! Thin typed wrappers over `GET /api/v1/logs`, `/api/v1/logs/trace/{id}`
//! and `/api/v1/logs/aggregated`. Unlike the delivery pipeline, failures
//! here surface to the caller: non-2xx responses and undecodable bodies
//! become [`Error::Api`], connection problems become [`Error::Transport`].

use crate::error::Error;
use crate::level::Level;
use crate::record::{LogRecord, LogsEnvelope};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Filters for [`query`]. Absent fields are omitted from the request.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Restrict to one service.
    pub service: Option<String>,
    /// Restrict to one severity level.
    pub level: Option<Level>,
    /// Lower bound on record time.
    pub from: Option<DateTime<Utc>>,
    /// Upper bound on record time.
    pub to: Option<DateTime<Utc>>,
    /// Full-text search term.
    pub q: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    /// Page offset.
    pub offset: Option<u32>,
}

impl QueryOptions {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(service) = &self.service {
            params.push(("service", service.clone()));
        }
        if let Some(level) = self.level {
            params.push(("level", level.as_str().to_string()));
        }
        if let Some(from) = self.from {
            params.push(("from", from.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(to) = self.to {
            params.push(("to", to.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(q) = &self.q {
            params.push(("q", q.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset", offset.to_string()));
        }
        params
    }
}

/// One page of query results.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub logs: Vec<LogRecord>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Filters for [`aggregated_stats`].
#[derive(Debug, Clone, Default)]
pub struct StatsOptions {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Bucket width, e.g. `"1h"`.
    pub interval: Option<String>,
    pub service: Option<String>,
}

impl StatsOptions {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = self.from {
            params.push(("from", from.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(to) = self.to {
            params.push(("to", to.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(interval) = &self.interval {
            params.push(("interval", interval.clone()));
        }
        if let Some(service) = &self.service {
            params.push(("service", service.clone()));
        }
        params
    }
}

/// One time bucket of the aggregated view.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeseriesBucket {
    pub bucket: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub by_level: HashMap<String, u64>,
}

/// Record count for one service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCount {
    pub service: String,
    pub count: u64,
}

/// Occurrence count for one error message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageCount {
    pub message: String,
    pub count: u64,
}

/// Aggregated log statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatedStats {
    #[serde(default)]
    pub timeseries: Vec<TimeseriesBucket>,
    #[serde(default)]
    pub top_services: Vec<ServiceCount>,
    #[serde(default)]
    pub top_errors: Vec<MessageCount>,
}

pub(crate) async fn query(
    http: &reqwest::Client,
    base_url: &str,
    options: &QueryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<QueryResponse, Error> {
    let url = format!("{base_url}/api/v1/logs");
    get_json(http, &url, options.to_params(), cancel).await
}

pub(crate) async fn logs_by_trace_id(
    http: &reqwest::Client,
    base_url: &str,
    trace_id: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<LogRecord>, Error> {
    let url = format!(
        "{base_url}/api/v1/logs/trace/{}",
        urlencoding::encode(trace_id)
    );
    let envelope: LogsEnvelope = get_json(http, &url, Vec::new(), cancel).await?;
    Ok(envelope.logs)
}

pub(crate) async fn aggregated_stats(
    http: &reqwest::Client,
    base_url: &str,
    options: &StatsOptions,
    cancel: Option<&CancellationToken>,
) -> Result<AggregatedStats, Error> {
    let url = format!("{base_url}/api/v1/logs/aggregated");
    get_json(http, &url, options.to_params(), cancel).await
}

async fn get_json<T: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    params: Vec<(&'static str, String)>,
    cancel: Option<&CancellationToken>,
) -> Result<T, Error> {
    let request = http.get(url).query(&params);
    let exchange = async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    let (status, body) = match cancel {
        Some(token) => tokio::select! {
            () = token.cancelled() => return Err(Error::Cancelled),
            result = exchange => result?,
        },
        None => exchange.await?,
    };

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|err| {
        debug!(%err, "failed to decode query response");
        Error::Api {
            status: status.as_u16(),
            body,
        }
    })
}
