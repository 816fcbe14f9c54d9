//! HTTP clients for the observability backends.
//!
//! The controller speaks each backend's existing API (Consul health,
//! Prometheus instant queries, Loki range queries); it never redefines
//! them. Clients share one `reqwest::Client` with a hard request timeout
//! so no backend query can stall a poll tick indefinitely.

pub mod logs;
pub mod metrics;
pub mod registry;

pub use logs::{LogSample, LokiClient};
pub use metrics::{MetricsSample, PrometheusClient};
pub use registry::{ConsulClient, RegistryHealth};

use std::time::Duration;

use serde::Serialize;

use crate::error::Error;

/// Which backend a query targeted; used in `BackendUnreachable` reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Registry,
    Metrics,
    Logs,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Registry => write!(f, "registry"),
            BackendKind::Metrics => write!(f, "metrics"),
            BackendKind::Logs => write!(f, "logs"),
        }
    }
}

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Error::from)
}

pub(crate) fn unreachable_err(backend: BackendKind, e: reqwest::Error) -> Error {
    Error::BackendUnreachable {
        backend,
        cause: e.to_string(),
    }
}
