//! Stack diagnostics.
//!
//! `meshfault doctor` answers "is the demo stack actually up": one
//! reachability probe per collaborator (substrate, registry, metrics,
//! logs, frontend), fanned out concurrently. Read-only; fault state is
//! never touched.

use std::sync::Arc;

use serde::Serialize;

use crate::backends::{self, ConsulClient, LokiClient, PrometheusClient};
use crate::config::MeshfaultConfig;
use crate::error::Error;
use crate::runner::CommandRunner;
use crate::substrate::SubstrateDetector;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub target: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl ProbeOutcome {
    fn passed(target: &'static str, detail: impl Into<String>) -> Self {
        Self {
            target,
            ok: true,
            detail: detail.into(),
        }
    }

    fn failed(target: &'static str, detail: impl Into<String>) -> Self {
        Self {
            target,
            ok: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub probes: Vec<ProbeOutcome>,
}

impl DoctorReport {
    pub fn all_ok(&self) -> bool {
        self.probes.iter().all(|probe| probe.ok)
    }
}

/// Probe every collaborator once.
pub async fn run(config: &MeshfaultConfig, runner: Arc<dyn CommandRunner>) -> Result<DoctorReport, Error> {
    let http = backends::http_client(config.http_timeout)?;
    let detector = SubstrateDetector::new(runner);
    let registry = ConsulClient::new(http.clone(), config.consul_url.clone());
    let metrics = PrometheusClient::new(
        http.clone(),
        config.prometheus_url.clone(),
        config.error_rate_query.clone(),
    );
    let logs = LokiClient::new(http.clone(), config.loki_url.clone());

    let substrate_probe = async {
        match detector.detect().await {
            Ok(substrate) => ProbeOutcome::passed("substrate", substrate.to_string()),
            Err(e) => ProbeOutcome::failed("substrate", e.to_string()),
        }
    };
    let registry_probe = async {
        match registry.leader().await {
            Ok(leader) => ProbeOutcome::passed("registry", format!("leader {leader}")),
            Err(e) => ProbeOutcome::failed("registry", e.to_string()),
        }
    };
    let metrics_probe = async {
        match metrics.ready().await {
            Ok(()) => ProbeOutcome::passed("metrics", "ready"),
            Err(e) => ProbeOutcome::failed("metrics", e.to_string()),
        }
    };
    let logs_probe = async {
        match logs.ready().await {
            Ok(()) => ProbeOutcome::passed("logs", "ready"),
            Err(e) => ProbeOutcome::failed("logs", e.to_string()),
        }
    };
    let frontend_probe = async {
        let result = async {
            let url = config
                .frontend_url
                .join("health")
                .map_err(|e| Error::Config {
                    message: format!("frontend URL: {e}"),
                })?;
            http.get(url).send().await?.error_for_status()?;
            Ok::<(), Error>(())
        }
        .await;
        match result {
            Ok(()) => ProbeOutcome::passed("frontend", "healthy"),
            Err(e) => ProbeOutcome::failed("frontend", e.to_string()),
        }
    };

    let (substrate, registry, metrics, logs, frontend) = tokio::join!(
        substrate_probe,
        registry_probe,
        metrics_probe,
        logs_probe,
        frontend_probe,
    );

    Ok(DoctorReport {
        probes: vec![substrate, registry, metrics, logs, frontend],
    })
}
