//! Per-service fault profiles.
//!
//! A profile is the full fault configuration one service reads from its
//! environment at process start: an error-injection rate and an added
//! latency distribution (p50/p90/p99). The baseline profile is the
//! zero-fault identity every service returns to.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::service::ServiceName;

/// Env-key suffixes, one per profile field. The demo workloads read
/// `MESHFAULT_<SERVICE>_<SUFFIX>` from their environment.
const KEY_ERROR_RATE: &str = "ERROR_RATE";
const KEY_LATENCY_P50: &str = "LATENCY_P50_MS";
const KEY_LATENCY_P90: &str = "LATENCY_P90_MS";
const KEY_LATENCY_P99: &str = "LATENCY_P99_MS";

/// Fault configuration for one service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultProfile {
    /// Fraction of requests answered with a 5xx, in `[0, 1]`.
    pub error_rate: f64,
    /// Added latency, median.
    #[serde(with = "duration_ms")]
    pub latency_p50: Duration,
    /// Added latency, 90th percentile.
    #[serde(with = "duration_ms")]
    pub latency_p90: Duration,
    /// Added latency, 99th percentile.
    #[serde(with = "duration_ms")]
    pub latency_p99: Duration,
}

impl FaultProfile {
    /// The zero-fault identity profile.
    pub fn baseline() -> Self {
        Self {
            error_rate: 0.0,
            latency_p50: Duration::ZERO,
            latency_p90: Duration::ZERO,
            latency_p99: Duration::ZERO,
        }
    }

    /// Build a validated profile.
    ///
    /// The error rate must be a finite value in `[0, 1]` and the latency
    /// percentiles must be non-decreasing.
    pub fn new(
        error_rate: f64,
        latency_p50: Duration,
        latency_p90: Duration,
        latency_p99: Duration,
    ) -> Result<Self, Error> {
        if !error_rate.is_finite() || !(0.0..=1.0).contains(&error_rate) {
            return Err(Error::ProfileInvalid {
                reason: format!("error rate {error_rate} is not in [0, 1]"),
            });
        }
        if latency_p90 < latency_p50 || latency_p99 < latency_p90 {
            return Err(Error::ProfileInvalid {
                reason: "latency percentiles must be non-decreasing (p50 <= p90 <= p99)".to_string(),
            });
        }
        Ok(Self {
            error_rate,
            latency_p50,
            latency_p90,
            latency_p99,
        })
    }

    pub fn is_baseline(&self) -> bool {
        *self == Self::baseline()
    }

    /// Environment pairs this profile materializes for `service`.
    ///
    /// Key order is stable so substrate writes are deterministic.
    pub fn to_env_pairs(&self, service: ServiceName) -> Vec<(String, String)> {
        let prefix = env_prefix(service);
        vec![
            (format!("{prefix}{KEY_ERROR_RATE}"), self.error_rate.to_string()),
            (
                format!("{prefix}{KEY_LATENCY_P50}"),
                self.latency_p50.as_millis().to_string(),
            ),
            (
                format!("{prefix}{KEY_LATENCY_P90}"),
                self.latency_p90.as_millis().to_string(),
            ),
            (
                format!("{prefix}{KEY_LATENCY_P99}"),
                self.latency_p99.as_millis().to_string(),
            ),
        ]
    }

    /// Reconstruct a profile from an environment map.
    ///
    /// Missing keys fall back: the error rate to zero, each latency
    /// percentile to the one below it. An empty map is therefore the
    /// baseline profile. Malformed values are `Store` errors naming the
    /// offending key.
    pub fn from_env_map(
        service: ServiceName,
        env: &BTreeMap<String, String>,
    ) -> Result<Self, Error> {
        let prefix = env_prefix(service);
        let error_rate = parse_f64(env, &format!("{prefix}{KEY_ERROR_RATE}"))?.unwrap_or(0.0);
        let latency_p50 =
            parse_ms(env, &format!("{prefix}{KEY_LATENCY_P50}"))?.unwrap_or(Duration::ZERO);
        let latency_p90 =
            parse_ms(env, &format!("{prefix}{KEY_LATENCY_P90}"))?.unwrap_or(latency_p50);
        let latency_p99 =
            parse_ms(env, &format!("{prefix}{KEY_LATENCY_P99}"))?.unwrap_or(latency_p90);
        Self::new(error_rate, latency_p50, latency_p90, latency_p99)
    }
}

fn env_prefix(service: ServiceName) -> String {
    format!("MESHFAULT_{}_", service.env_segment())
}

fn parse_f64(env: &BTreeMap<String, String>, key: &str) -> Result<Option<f64>, Error> {
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| Error::Store {
            cause: format!("malformed value for {key}: {raw:?} (expected a float)"),
        }),
    }
}

fn parse_ms(env: &BTreeMap<String, String>, key: &str) -> Result<Option<Duration>, Error> {
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| Error::Store {
                cause: format!("malformed value for {key}: {raw:?} (expected integer milliseconds)"),
            }),
    }
}

/// Serde adapter storing durations as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
