//! Error taxonomy for the fault-injection controller.
//!
//! Every variant is recoverable by operator retry; none is treated as a
//! process crash. The CLI maps variants to exit codes and a human-readable
//! next action.

use std::time::Duration;

use thiserror::Error;

use crate::backends::BackendKind;
use crate::service::ServiceName;

#[derive(Debug, Error)]
pub enum Error {
    /// Neither a compose project nor a cluster answered the probes.
    #[error(
        "no supported substrate detected; start the stack with `docker compose up -d` \
         or bring up the demo cluster, then re-run"
    )]
    SubstrateUnknown,

    /// The named service is not part of the mesh.
    #[error("unknown service '{name}' (known: web, api, payments, currency, cache, rates)")]
    ServiceUnknown { name: String },

    /// A fault profile failed validation.
    #[error("invalid fault profile: {reason}")]
    ProfileInvalid { reason: String },

    /// The substrate rejected a restart request.
    #[error("restart of '{service}' failed: {cause}")]
    RestartFailed {
        service: ServiceName,
        cause: String,
    },

    /// The expectation did not hold within the validation budget.
    #[error("validation timed out after {:.1}s", .waited.as_secs_f64())]
    ValidationTimedOut { waited: Duration },

    /// A registry/metrics/logs query failed.
    #[error("{backend} backend unreachable: {cause}")]
    BackendUnreachable {
        backend: BackendKind,
        cause: String,
    },

    /// Fault parameter persistence failed.
    #[error("fault store error: {cause}")]
    Store { cause: String },

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The run was cancelled by the operator.
    #[error("cancelled by operator")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
