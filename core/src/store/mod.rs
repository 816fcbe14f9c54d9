//! Fault parameter persistence.
//!
//! One substrate-independent contract with a file-backed implementation
//! for compose and a deployment-env-backed implementation for clusters.
//! The orchestration controller is the sole writer for the duration of a
//! run, so implementations carry no internal locking; concurrent
//! controller invocations are unsupported.

mod cluster;
mod env_file;

pub use cluster::ClusterEnvStore;
pub use env_file::EnvFileStore;

use async_trait::async_trait;

use crate::error::Error;
use crate::profile::FaultProfile;
use crate::service::ServiceName;

/// Substrate-independent fault parameter store.
#[async_trait]
pub trait FaultStore: Send + Sync {
    /// Current profile for `service`; baseline if never set.
    async fn get(&self, service: ServiceName) -> Result<FaultProfile, Error>;

    /// Persist `profile` for `service`. Idempotent, last-write-wins.
    async fn set(&self, service: ServiceName, profile: &FaultProfile) -> Result<(), Error>;

    /// Restore every known service to baseline in one call.
    ///
    /// Idempotent; invoked unconditionally during scoped cleanup, so it
    /// must be safe to call when already at baseline.
    async fn reset_all(&self) -> Result<(), Error>;
}
