//! Backend adapters: persist a fault profile, then make it take effect.
//!
//! The demo workloads read fault parameters from their environment once
//! at process start — an external constraint of the workloads, not a
//! choice made here — so "take effect" means requesting a restart of the
//! owning unit. A substrate with live reconfiguration would replace
//! `request_restart` with a no-op reconfigure call; the contract would
//! not change.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::MeshfaultConfig;
use crate::error::Error;
use crate::profile::FaultProfile;
use crate::runner::CommandRunner;
use crate::service::ServiceName;
use crate::store::{ClusterEnvStore, EnvFileStore, FaultStore};
use crate::substrate::Substrate;

/// Applies fault profiles on one substrate.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn substrate(&self) -> Substrate;

    /// Persist `profile` and request a restart of `service`.
    ///
    /// Returns once the restart has been *requested*; confirming that the
    /// fault actually propagated is the health validator's job. Failures
    /// are not retried here — fault injection is an explicit operator
    /// action, and a retry is a re-run.
    async fn apply_fault(&self, service: ServiceName, profile: &FaultProfile)
    -> Result<(), Error>;

    /// Ask the substrate to recreate the unit owning `service` so it
    /// re-reads its fault environment.
    async fn request_restart(&self, service: ServiceName) -> Result<(), Error>;

    /// The store this adapter persists through.
    fn store(&self) -> Arc<dyn FaultStore>;
}

/// Shared persist-then-restart sequence.
async fn persist_and_restart(
    adapter: &dyn BackendAdapter,
    service: ServiceName,
    profile: &FaultProfile,
) -> Result<(), Error> {
    adapter.store().set(service, profile).await?;
    tracing::info!(%service, error_rate = profile.error_rate, "fault profile persisted");
    adapter.request_restart(service).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Compose
// ─────────────────────────────────────────────────────────────────────────────

pub struct ComposeAdapter {
    runner: Arc<dyn CommandRunner>,
    store: Arc<EnvFileStore>,
}

impl ComposeAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<EnvFileStore>) -> Self {
        Self { runner, store }
    }
}

#[async_trait]
impl BackendAdapter for ComposeAdapter {
    fn substrate(&self) -> Substrate {
        Substrate::Compose
    }

    async fn apply_fault(
        &self,
        service: ServiceName,
        profile: &FaultProfile,
    ) -> Result<(), Error> {
        persist_and_restart(self, service, profile).await
    }

    async fn request_restart(&self, service: ServiceName) -> Result<(), Error> {
        // Recreate rather than restart: env interpolation is resolved at
        // container creation, so a plain restart would keep stale values.
        let output = self
            .runner
            .run(
                "docker",
                &[
                    "compose",
                    "up",
                    "-d",
                    "--force-recreate",
                    "--no-deps",
                    service.as_str(),
                ],
            )
            .await
            .map_err(|e| Error::RestartFailed {
                service,
                cause: e.to_string(),
            })?;

        if !output.success() {
            return Err(Error::RestartFailed {
                service,
                cause: output.diagnostic().to_string(),
            });
        }
        tracing::info!(%service, substrate = %Substrate::Compose, "restart requested");
        Ok(())
    }

    fn store(&self) -> Arc<dyn FaultStore> {
        self.store.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cluster
// ─────────────────────────────────────────────────────────────────────────────

pub struct ClusterAdapter {
    runner: Arc<dyn CommandRunner>,
    store: Arc<ClusterEnvStore>,
    namespace: String,
}

impl ClusterAdapter {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<ClusterEnvStore>, namespace: String) -> Self {
        Self {
            runner,
            store,
            namespace,
        }
    }
}

#[async_trait]
impl BackendAdapter for ClusterAdapter {
    fn substrate(&self) -> Substrate {
        Substrate::Cluster
    }

    async fn apply_fault(
        &self,
        service: ServiceName,
        profile: &FaultProfile,
    ) -> Result<(), Error> {
        persist_and_restart(self, service, profile).await
    }

    async fn request_restart(&self, service: ServiceName) -> Result<(), Error> {
        // `kubectl set env` only rolls pods when a value actually changed;
        // the explicit rollout restart keeps apply semantics uniform when
        // an identical profile is reapplied.
        let deployment = format!("deployment/{service}");
        let output = self
            .runner
            .run(
                "kubectl",
                &["-n", self.namespace.as_str(), "rollout", "restart", &deployment],
            )
            .await
            .map_err(|e| Error::RestartFailed {
                service,
                cause: e.to_string(),
            })?;

        if !output.success() {
            return Err(Error::RestartFailed {
                service,
                cause: output.diagnostic().to_string(),
            });
        }
        tracing::info!(%service, substrate = %Substrate::Cluster, "restart requested");
        Ok(())
    }

    fn store(&self) -> Arc<dyn FaultStore> {
        self.store.clone()
    }
}

/// Build the store/adapter pair for a detected substrate.
pub fn for_substrate(
    substrate: Substrate,
    config: &MeshfaultConfig,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn BackendAdapter> {
    match substrate {
        Substrate::Compose => {
            let store = Arc::new(EnvFileStore::new(config.fault_env_file.clone()));
            Arc::new(ComposeAdapter::new(runner, store))
        }
        Substrate::Cluster => {
            let store = Arc::new(ClusterEnvStore::new(
                runner.clone(),
                config.kube_namespace.clone(),
            ));
            Arc::new(ClusterAdapter::new(runner, store, config.kube_namespace.clone()))
        }
    }
}
