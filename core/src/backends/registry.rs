//! Consul service registry client.
//!
//! Read-only: the controller asks "is this service registered and
//! passing its checks", never mutates the catalog.

use serde::Deserialize;
use url::Url;

use crate::backends::{BackendKind, unreachable_err};
use crate::error::Error;
use crate::service::ServiceName;

/// One health check as returned by `/v1/health/checks/<service>`.
#[derive(Debug, Deserialize)]
struct ConsulCheck {
    #[serde(rename = "Status")]
    status: String,
}

/// Aggregated registry view of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryHealth {
    pub checks_total: usize,
    pub checks_passing: usize,
}

impl RegistryHealth {
    /// Registered with at least one check, all of them passing.
    pub fn is_passing(&self) -> bool {
        self.checks_total > 0 && self.checks_passing == self.checks_total
    }
}

pub struct ConsulClient {
    http: reqwest::Client,
    base: Url,
}

impl ConsulClient {
    pub fn new(http: reqwest::Client, base: Url) -> Self {
        Self { http, base }
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base.join(path).map_err(|e| Error::BackendUnreachable {
            backend: BackendKind::Registry,
            cause: format!("invalid registry URL: {e}"),
        })
    }

    /// Check states for `service` from the registry's health API.
    pub async fn service_health(&self, service: ServiceName) -> Result<RegistryHealth, Error> {
        let url = self.endpoint(&format!("v1/health/checks/{service}"))?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?;

        let checks: Vec<ConsulCheck> = response
            .json()
            .await
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?;

        Ok(RegistryHealth {
            checks_total: checks.len(),
            checks_passing: checks
                .iter()
                .filter(|check| check.status == "passing")
                .count(),
        })
    }

    /// Current raft leader address; the doctor's reachability probe.
    pub async fn leader(&self) -> Result<String, Error> {
        let url = self.endpoint("v1/status/leader")?;
        let leader: String = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?
            .error_for_status()
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?
            .json()
            .await
            .map_err(|e| unreachable_err(BackendKind::Registry, e))?;

        if leader.is_empty() {
            return Err(Error::BackendUnreachable {
                backend: BackendKind::Registry,
                cause: "registry has no leader".to_string(),
            });
        }
        Ok(leader)
    }
}
