//! Deployment-env-backed fault store for the cluster substrate.
//!
//! Profiles are carried as environment variables on each service's
//! deployment spec, mutated through `kubectl set env` and read back via
//! jsonpath. The deployment spec is the persistence: it survives pod
//! restarts and is what the workload reads at process start.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Error;
use crate::profile::FaultProfile;
use crate::runner::CommandRunner;
use crate::service::ServiceName;
use crate::store::FaultStore;

const ENV_JSONPATH: &str = "jsonpath={.spec.template.spec.containers[0].env}";

/// One entry of a container `env` array.
#[derive(Debug, Deserialize)]
struct EnvEntry {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

pub struct ClusterEnvStore {
    runner: Arc<dyn CommandRunner>,
    namespace: String,
}

impl ClusterEnvStore {
    pub fn new(runner: Arc<dyn CommandRunner>, namespace: String) -> Self {
        Self { runner, namespace }
    }

    async fn kubectl(&self, args: &[&str]) -> Result<String, Error> {
        let mut full = vec!["-n", self.namespace.as_str()];
        full.extend_from_slice(args);
        let output = self
            .runner
            .run("kubectl", &full)
            .await
            .map_err(|e| Error::Store {
                cause: e.to_string(),
            })?;
        if !output.success() {
            return Err(Error::Store {
                cause: format!("kubectl {}: {}", args.join(" "), output.diagnostic()),
            });
        }
        Ok(output.stdout)
    }

    async fn set_env_pairs(
        &self,
        service: ServiceName,
        pairs: &[(String, String)],
    ) -> Result<(), Error> {
        let deployment = format!("deployment/{service}");
        let assignments: Vec<String> = pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut args = vec!["set", "env", deployment.as_str()];
        args.extend(assignments.iter().map(String::as_str));
        self.kubectl(&args).await.map(|_| ())
    }
}

#[async_trait]
impl FaultStore for ClusterEnvStore {
    async fn get(&self, service: ServiceName) -> Result<FaultProfile, Error> {
        let deployment = service.as_str();
        let raw = self
            .kubectl(&["get", "deployment", deployment, "-o", ENV_JSONPATH])
            .await?;

        let raw = raw.trim();
        let map = if raw.is_empty() {
            Default::default()
        } else {
            let entries: Vec<EnvEntry> = serde_json::from_str(raw).map_err(|e| Error::Store {
                cause: format!("parsing env of deployment/{deployment}: {e}"),
            })?;
            entries
                .into_iter()
                .filter_map(|entry| entry.value.map(|value| (entry.name, value)))
                .collect()
        };

        FaultProfile::from_env_map(service, &map)
    }

    async fn set(&self, service: ServiceName, profile: &FaultProfile) -> Result<(), Error> {
        self.set_env_pairs(service, &profile.to_env_pairs(service))
            .await
    }

    async fn reset_all(&self) -> Result<(), Error> {
        let baseline = FaultProfile::baseline();
        for service in ServiceName::ALL {
            self.set_env_pairs(service, &baseline.to_env_pairs(service))
                .await?;
        }
        Ok(())
    }
}
