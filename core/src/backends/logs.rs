//! Loki log backend client.
//!
//! Label-filtered range queries over a trailing window. The controller
//! only counts matched lines (and how many of them look like errors) to
//! confirm the service is emitting; it never ingests or stores logs.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use url::Url;

use crate::backends::{BackendKind, unreachable_err};
use crate::error::Error;
use crate::service::ServiceName;

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryRangeData>,
}

#[derive(Debug, Deserialize)]
struct QueryRangeData {
    result: Vec<LogStream>,
}

#[derive(Debug, Deserialize)]
struct LogStream {
    /// `[["<ns timestamp>", "<line>"], ...]`
    values: Vec<(String, String)>,
}

/// Line counts for one service over the query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LogSample {
    pub lines: u64,
    pub error_lines: u64,
}

pub struct LokiClient {
    http: reqwest::Client,
    base: Url,
}

impl LokiClient {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base.join(path).map_err(|e| Error::BackendUnreachable {
            backend: BackendKind::Logs,
            cause: format!("invalid logs URL: {e}"),
        })
    }

    /// Count lines labeled with `service` over the trailing `window`.
    pub async fn recent(&self, service: ServiceName, window: Duration) -> Result<LogSample, Error> {
        let end = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let start = end.saturating_sub(window);
        let selector = format!("{{service=\"{service}\"}}");
        let url = self.endpoint("loki/api/v1/query_range")?;

        let response: QueryRangeResponse = self
            .http
            .get(url)
            .query(&[
                ("query", selector.as_str()),
                ("start", &start.as_nanos().to_string()),
                ("end", &end.as_nanos().to_string()),
            ])
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Logs, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Logs, e))?
            .json()
            .await
            .map_err(|e| unreachable_err(BackendKind::Logs, e))?;

        if response.status != "success" {
            return Err(Error::BackendUnreachable {
                backend: BackendKind::Logs,
                cause: format!("query returned status {:?}", response.status),
            });
        }

        let mut sample = LogSample {
            lines: 0,
            error_lines: 0,
        };
        if let Some(data) = response.data {
            for stream in data.result {
                for (_ts, line) in stream.values {
                    sample.lines += 1;
                    if line.to_ascii_lowercase().contains("error") {
                        sample.error_lines += 1;
                    }
                }
            }
        }
        Ok(sample)
    }

    /// Readiness probe (`/ready`); the doctor's reachability check.
    pub async fn ready(&self) -> Result<(), Error> {
        let url = self.endpoint("ready")?;
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Logs, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Logs, e))?;
        Ok(())
    }
}
