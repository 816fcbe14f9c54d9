//! Health validation.
//!
//! After a fault is applied (or reset), the validator polls the registry,
//! metrics, and log backends until an expectation holds or the budget
//! runs out. Each tick fans out to all three backends concurrently and
//! joins before judging — their propagation latencies are independent, so
//! sequential polling would serialize unrelated waits.
//!
//! A backend being unreachable degrades the snapshot (that field is
//! absent) instead of failing the poll: a dashboard backend flapping must
//! not be mistaken for a failed fault injection.

use std::time::Duration;

use async_trait::async_trait;
use meshfault_async_utils::{Interrupted, OrCancelExt};
use meshfault_readiness::{PollPlan, Probe, poll_until_ready};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backends::{ConsulClient, LogSample, LokiClient, MetricsSample, PrometheusClient, RegistryHealth};
use crate::error::Error;
use crate::service::ServiceName;

/// What the operator expects the backends to show.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Expectation {
    /// The injected fault is visible: observed 5xx rate at or above the
    /// given floor.
    FaultActive {
        service: ServiceName,
        min_error_rate: f64,
    },
    /// The mesh is back at baseline: observed 5xx rate at or below the
    /// ceiling and, when the registry answered, all checks passing.
    BaselineRestored {
        service: ServiceName,
        max_error_rate: f64,
    },
}

impl Expectation {
    pub fn service(&self) -> ServiceName {
        match self {
            Expectation::FaultActive { service, .. }
            | Expectation::BaselineRestored { service, .. } => *service,
        }
    }
}

/// Point-in-time view over the three backends. Absent fields record that
/// backend as unreachable for this tick; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub registry: Option<RegistryHealth>,
    pub metrics: Option<MetricsSample>,
    pub logs: Option<LogSample>,
}

impl HealthSnapshot {
    /// At least one backend did not answer.
    pub fn is_partial(&self) -> bool {
        self.registry.is_none() || self.metrics.is_none() || self.logs.is_none()
    }

    /// Judge this snapshot against an expectation.
    ///
    /// Metrics are required evidence: an expectation never matches on a
    /// snapshot whose metrics field is absent. The registry contributes
    /// only when it answered.
    pub fn satisfies(&self, expectation: &Expectation) -> bool {
        match expectation {
            Expectation::FaultActive { min_error_rate, .. } => self
                .metrics
                .is_some_and(|m| m.error_rate >= *min_error_rate),
            Expectation::BaselineRestored { max_error_rate, .. } => {
                let metrics_ok = self
                    .metrics
                    .is_some_and(|m| m.error_rate <= *max_error_rate);
                let registry_ok = self.registry.is_none_or(|r| r.is_passing());
                metrics_ok && registry_ok
            }
        }
    }
}

/// Final word of a bounded validation.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub snapshot: HealthSnapshot,
    pub satisfied: bool,
    pub ticks: u32,
    #[serde(serialize_with = "secs_f64")]
    pub elapsed: Duration,
}

fn secs_f64<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

pub struct HealthValidator {
    registry: ConsulClient,
    metrics: PrometheusClient,
    logs: LokiClient,
    poll_interval: Duration,
    log_window: Duration,
}

impl HealthValidator {
    pub fn new(
        registry: ConsulClient,
        metrics: PrometheusClient,
        logs: LokiClient,
        poll_interval: Duration,
        log_window: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            logs,
            poll_interval,
            log_window,
        }
    }

    /// One fan-out/fan-in observation of all three backends.
    pub async fn snapshot(&self, service: ServiceName) -> HealthSnapshot {
        let (registry, metrics, logs) = tokio::join!(
            self.registry.service_health(service),
            self.metrics.error_rate(service),
            self.logs.recent(service, self.log_window),
        );

        HealthSnapshot {
            registry: note_unreachable(registry),
            metrics: note_unreachable(metrics),
            logs: note_unreachable(logs),
        }
    }

    /// Poll until `expectation` holds or `budget` elapses.
    ///
    /// Always returns within the budget (plus one in-flight tick) with
    /// the last snapshot taken, ready or not — the caller decides what a
    /// non-ready final snapshot means. Cancellation aborts immediately
    /// with `Error::Cancelled`.
    pub async fn poll(
        &self,
        expectation: &Expectation,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<Validation, Error> {
        let plan = PollPlan::new(self.poll_interval, budget).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let mut probe = ExpectationProbe {
            validator: self,
            expectation: *expectation,
        };

        let outcome = poll_until_ready(&plan, &mut probe)
            .or_cancel(cancel)
            .await
            .map_err(|_: Interrupted| Error::Cancelled)?;

        tracing::info!(
            satisfied = outcome.ready,
            ticks = outcome.ticks,
            elapsed_s = outcome.elapsed.as_secs_f64(),
            "validation poll finished"
        );

        Ok(Validation {
            snapshot: outcome.last,
            satisfied: outcome.ready,
            ticks: outcome.ticks,
            elapsed: outcome.elapsed,
        })
    }
}

fn note_unreachable<T>(result: Result<T, Error>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "backend query failed; snapshot degrades to partial");
            None
        }
    }
}

struct ExpectationProbe<'a> {
    validator: &'a HealthValidator,
    expectation: Expectation,
}

#[async_trait]
impl Probe for ExpectationProbe<'_> {
    type Observation = HealthSnapshot;

    async fn observe(&mut self) -> HealthSnapshot {
        self.validator.snapshot(self.expectation.service()).await
    }

    fn is_ready(&self, snapshot: &HealthSnapshot) -> bool {
        snapshot.satisfies(&self.expectation)
    }
}
