//! The fixed set of mesh participants.
//!
//! Every backend query (registry health, metrics, logs) and every fault
//! mutation is keyed by one of these names, so the set is a closed enum:
//! an operator typo becomes a `ServiceUnknown` error at the CLI boundary
//! instead of a silent no-op against a nonexistent deployment.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One mesh participant, as registered in the service registry and named
/// in compose/deployment units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Web,
    Api,
    Payments,
    Currency,
    Cache,
    Rates,
}

impl ServiceName {
    /// All known services, in stable order.
    pub const ALL: [ServiceName; 6] = [
        ServiceName::Web,
        ServiceName::Api,
        ServiceName::Payments,
        ServiceName::Currency,
        ServiceName::Cache,
        ServiceName::Rates,
    ];

    /// Lowercase name used by the registry, compose units, and deployments.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceName::Web => "web",
            ServiceName::Api => "api",
            ServiceName::Payments => "payments",
            ServiceName::Currency => "currency",
            ServiceName::Cache => "cache",
            ServiceName::Rates => "rates",
        }
    }

    /// Uppercase segment used in fault environment keys
    /// (`MESHFAULT_<SEGMENT>_ERROR_RATE`).
    pub fn env_segment(&self) -> &'static str {
        match self {
            ServiceName::Web => "WEB",
            ServiceName::Api => "API",
            ServiceName::Payments => "PAYMENTS",
            ServiceName::Currency => "CURRENCY",
            ServiceName::Cache => "CACHE",
            ServiceName::Rates => "RATES",
        }
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str() == lower)
            .ok_or_else(|| Error::ServiceUnknown {
                name: s.to_string(),
            })
    }
}
