//! Prometheus metrics client.
//!
//! The controller needs exactly one number per poll tick: the observed
//! 5xx rate for a service, read with an instant query. The PromQL
//! expression is a configurable template with a `{service}` placeholder
//! so deployments with different sidecar metric names can adjust it
//! without code changes.

use serde::Deserialize;
use url::Url;

use crate::backends::{BackendKind, unreachable_err};
use crate::error::Error;
use crate::service::ServiceName;

/// Instant-query envelope (`/api/v1/query`).
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// `[unix_ts, "value"]`
    value: (f64, String),
}

/// One observed metrics reading for a service.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct MetricsSample {
    /// Observed 5xx rate in `[0, 1]`; `0.0` when the query matched no
    /// series (no traffic yet counts as no observed errors).
    pub error_rate: f64,
}

pub struct PrometheusClient {
    http: reqwest::Client,
    base: Url,
    error_rate_query: String,
}

impl PrometheusClient {
    pub fn new(http: reqwest::Client, base: Url, error_rate_query: String) -> Self {
        Self {
            http,
            base,
            error_rate_query,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base.join(path).map_err(|e| Error::BackendUnreachable {
            backend: BackendKind::Metrics,
            cause: format!("invalid metrics URL: {e}"),
        })
    }

    /// Observed 5xx rate for `service` via the configured instant query.
    pub async fn error_rate(&self, service: ServiceName) -> Result<MetricsSample, Error> {
        let query = self.error_rate_query.replace("{service}", service.as_str());
        let url = self.endpoint("api/v1/query")?;

        let response: QueryResponse = self
            .http
            .get(url)
            .query(&[("query", query.as_str())])
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Metrics, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Metrics, e))?
            .json()
            .await
            .map_err(|e| unreachable_err(BackendKind::Metrics, e))?;

        if response.status != "success" {
            return Err(Error::BackendUnreachable {
                backend: BackendKind::Metrics,
                cause: format!("query returned status {:?}", response.status),
            });
        }

        let data = response.data.ok_or_else(|| Error::BackendUnreachable {
            backend: BackendKind::Metrics,
            cause: "query response carried no data".to_string(),
        })?;
        if data.result_type != "vector" {
            return Err(Error::BackendUnreachable {
                backend: BackendKind::Metrics,
                cause: format!("expected a vector result, got {:?}", data.result_type),
            });
        }

        let error_rate = match data.result.first() {
            None => 0.0,
            Some(sample) => sample.value.1.parse::<f64>().map_err(|_| {
                Error::BackendUnreachable {
                    backend: BackendKind::Metrics,
                    cause: format!("unparseable sample value {:?}", sample.value.1),
                }
            })?,
        };

        // PromQL NaN (0/0 in a ratio) means "no traffic", not an error.
        let error_rate = if error_rate.is_nan() { 0.0 } else { error_rate };

        Ok(MetricsSample { error_rate })
    }

    /// Readiness probe (`/-/ready`); the doctor's reachability check.
    pub async fn ready(&self) -> Result<(), Error> {
        let url = self.endpoint("-/ready")?;
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Metrics, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Metrics, e))?;
        Ok(())
    }
}
