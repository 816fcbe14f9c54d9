//! Deployment substrate detection.
//!
//! The demo stack runs either as a Docker Compose project or inside a
//! Kubernetes cluster. Which one is active is derived from the
//! environment once per invocation and dispatched on as a tagged variant;
//! nothing downstream re-inspects tooling.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::runner::CommandRunner;

/// The deployment technology hosting the demo services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Substrate {
    /// Docker Compose project on the local daemon.
    Compose,
    /// Kubernetes cluster reachable through the current kubeconfig.
    Cluster,
}

impl std::fmt::Display for Substrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Substrate::Compose => write!(f, "compose"),
            Substrate::Cluster => write!(f, "cluster"),
        }
    }
}

/// Probes the environment for an active substrate.
///
/// Probe order is fixed (compose, then cluster) so detection is
/// deterministic for a given environment: a workstation with both a
/// running compose project and a kubeconfig always resolves to compose.
pub struct SubstrateDetector {
    runner: Arc<dyn CommandRunner>,
}

impl SubstrateDetector {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Detect the active substrate.
    ///
    /// Side-effect-free apart from the probe commands themselves. Returns
    /// `SubstrateUnknown` when neither probe succeeds; callers surface the
    /// guidance and exit without mutating state.
    pub async fn detect(&self) -> Result<Substrate, Error> {
        if self.compose_running().await {
            tracing::info!(substrate = %Substrate::Compose, "substrate detected");
            return Ok(Substrate::Compose);
        }
        if self.cluster_reachable().await {
            tracing::info!(substrate = %Substrate::Cluster, "substrate detected");
            return Ok(Substrate::Cluster);
        }
        Err(Error::SubstrateUnknown)
    }

    /// A compose project counts as running when at least one of its
    /// services has a running container.
    async fn compose_running(&self) -> bool {
        match self
            .runner
            .run("docker", &["compose", "ps", "--services", "--status", "running"])
            .await
        {
            Ok(output) => output.success() && !output.stdout.trim().is_empty(),
            Err(e) => {
                tracing::debug!(error = %e, "compose probe failed");
                false
            }
        }
    }

    /// The cluster counts as reachable when the API server answers a
    /// deployment listing in the demo namespace.
    async fn cluster_reachable(&self) -> bool {
        match self
            .runner
            .run("kubectl", &["get", "deployments", "-o", "name"])
            .await
        {
            Ok(output) => output.success() && !output.stdout.trim().is_empty(),
            Err(e) => {
                tracing::debug!(error = %e, "cluster probe failed");
                false
            }
        }
    }
}
