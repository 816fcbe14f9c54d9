//! Orchestration of a fault-injection run.
//!
//! One controller run walks the state machine
//! `Idle → SubstrateDetected → ParametersApplied → AwaitingPropagation →
//! Validated | TimedOut → Restored`, with `Restored` the sole terminal
//! state on every path: normal completion, adapter failure, validation
//! timeout, and operator cancellation all funnel through the same
//! restore step, which resets every fault profile to baseline exactly
//! once. Detection failure is the one exception — nothing has been
//! mutated yet, so there is nothing to restore.
//!
//! Concurrent controller invocations are unsupported: the fault store has
//! a single writer for the duration of a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use meshfault_async_utils::OrCancelExt;

use crate::adapter::{self, BackendAdapter};
use crate::backends::{self, ConsulClient, LokiClient, PrometheusClient, RegistryHealth};
use crate::config::MeshfaultConfig;
use crate::error::Error;
use crate::profile::FaultProfile;
use crate::runner::CommandRunner;
use crate::service::ServiceName;
use crate::substrate::{Substrate, SubstrateDetector};
use crate::traffic::{TrafficGenerator, TrafficReport};
use crate::validator::{Expectation, HealthValidator, Validation};

/// Fraction of the injected error rate that must show up in the metrics
/// backend before a fault counts as propagated. Sidecar retries and
/// scrape timing mean the observed ratio trails the configured one.
const FAULT_VISIBILITY_FRACTION: f64 = 0.5;

/// Observed-rate ceiling for a restored baseline.
const BASELINE_ERROR_CEILING: f64 = 0.02;

/// States of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    SubstrateDetected,
    ParametersApplied,
    AwaitingPropagation,
    Validated,
    TimedOut,
    Restored,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::SubstrateDetected => "substrate-detected",
            RunState::ParametersApplied => "parameters-applied",
            RunState::AwaitingPropagation => "awaiting-propagation",
            RunState::Validated => "validated",
            RunState::TimedOut => "timed-out",
            RunState::Restored => "restored",
        };
        f.write_str(name)
    }
}

/// How the run concluded, before restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The expectation held within the budget.
    Validated,
    /// The budget elapsed first; reported, not fatal.
    TimedOut,
    /// The operator cancelled mid-run.
    Cancelled,
    /// A reset run completed.
    CleanReset,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunOutcome::Validated => "validated",
            RunOutcome::TimedOut => "timed-out",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::CleanReset => "clean-reset",
        };
        f.write_str(name)
    }
}

/// Report of one completed (and restored) run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub substrate: Substrate,
    pub state: RunState,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficReport>,
}

/// Per-service line of a `status` listing.
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceName,
    pub profile: FaultProfile,
    pub registry: Option<RegistryHealth>,
}

/// Options for an inject run.
#[derive(Debug, Clone, Copy)]
pub struct InjectOptions {
    /// Generate demo traffic while validating. Without it the metrics
    /// backend has nothing to show and validation will usually time out.
    pub traffic: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self { traffic: true }
    }
}

pub struct Controller {
    config: MeshfaultConfig,
    runner: Arc<dyn CommandRunner>,
    detector: SubstrateDetector,
    validator: HealthValidator,
    http: reqwest::Client,
}

impl Controller {
    pub fn new(config: MeshfaultConfig, runner: Arc<dyn CommandRunner>) -> Result<Self, Error> {
        let http = backends::http_client(config.http_timeout)?;
        let validator = HealthValidator::new(
            ConsulClient::new(http.clone(), config.consul_url.clone()),
            PrometheusClient::new(
                http.clone(),
                config.prometheus_url.clone(),
                config.error_rate_query.clone(),
            ),
            LokiClient::new(http.clone(), config.loki_url.clone()),
            config.poll_interval,
            config.log_window,
        );
        Ok(Self {
            detector: SubstrateDetector::new(runner.clone()),
            validator,
            http,
            config,
            runner,
        })
    }

    /// Inject `profile` into `service`, validate propagation, restore.
    ///
    /// Restoration runs on every path past substrate detection; a restore
    /// failure is logged but never masks the run's own result.
    pub async fn inject(
        &self,
        service: ServiceName,
        profile: FaultProfile,
        options: InjectOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, Error> {
        let mut state = RunState::Idle;
        let substrate = self.detector.detect().await?;
        advance(&mut state, RunState::SubstrateDetected);

        let adapter = adapter::for_substrate(substrate, &self.config, self.runner.clone());
        let restore = RestoreGuard::new(adapter.clone());

        let (outcome, validation, traffic, failure) = self
            .drive_inject(service, profile, options, &adapter, &mut state, cancel)
            .await;

        restore.restore(&[service]).await;
        advance(&mut state, RunState::Restored);

        if let Some(e) = failure {
            return Err(e);
        }
        Ok(RunReport {
            substrate,
            state,
            outcome,
            validation,
            traffic,
        })
    }

    /// The mutating middle of an inject run. Never performs restoration;
    /// the caller owns that unconditionally.
    async fn drive_inject(
        &self,
        service: ServiceName,
        profile: FaultProfile,
        options: InjectOptions,
        adapter: &Arc<dyn BackendAdapter>,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> (
        RunOutcome,
        Option<Validation>,
        Option<TrafficReport>,
        Option<Error>,
    ) {
        match adapter.apply_fault(service, &profile).or_cancel(cancel).await {
            Err(_interrupted) => {
                tracing::warn!(%service, "cancelled while applying fault parameters");
                return (RunOutcome::Cancelled, None, None, None);
            }
            Ok(Err(e)) => {
                // Adapter failure: skip propagation, go straight to restore.
                return (RunOutcome::Cancelled, None, None, Some(e));
            }
            Ok(Ok(())) => {}
        }
        advance(state, RunState::ParametersApplied);
        advance(state, RunState::AwaitingPropagation);

        let deadline = Instant::now() + self.config.validation_timeout;
        let traffic_cancel = cancel.child_token();
        let traffic_handle = options.traffic.then(|| {
            let generator = TrafficGenerator::new(
                self.http.clone(),
                self.config.frontend_url.clone(),
                self.config.traffic_workers,
                self.config.traffic_pacing,
            );
            let token = traffic_cancel.clone();
            tokio::spawn(async move { generator.drive(deadline, &token).await })
        });

        // Latency-only faults (zero error rate) validate on the metrics
        // backend answering at all: the floor degenerates to zero.
        let expectation = Expectation::FaultActive {
            service,
            min_error_rate: profile.error_rate * FAULT_VISIBILITY_FRACTION,
        };
        let validation = self
            .validator
            .poll(&expectation, self.config.validation_timeout, cancel)
            .await;

        // Stop traffic as a group and collect its report.
        traffic_cancel.cancel();
        let traffic = match traffic_handle {
            None => None,
            Some(handle) => handle.await.ok(),
        };

        match validation {
            Ok(validation) => {
                let outcome = if validation.satisfied {
                    advance(state, RunState::Validated);
                    RunOutcome::Validated
                } else {
                    advance(state, RunState::TimedOut);
                    tracing::warn!(
                        %service,
                        waited_s = validation.elapsed.as_secs_f64(),
                        "fault not observed within budget"
                    );
                    RunOutcome::TimedOut
                };
                (outcome, Some(validation), traffic, None)
            }
            Err(Error::Cancelled) => {
                tracing::warn!(%service, "cancelled while awaiting propagation");
                (RunOutcome::Cancelled, None, traffic, None)
            }
            Err(e) => (RunOutcome::Cancelled, None, traffic, Some(e)),
        }
    }

    /// Reset every service to baseline and restart them.
    pub async fn reset(&self, cancel: &CancellationToken) -> Result<RunReport, Error> {
        let mut state = RunState::Idle;
        let substrate = self.detector.detect().await?;
        advance(&mut state, RunState::SubstrateDetected);

        let adapter = adapter::for_substrate(substrate, &self.config, self.runner.clone());
        adapter.store().reset_all().await?;
        advance(&mut state, RunState::ParametersApplied);

        let mut first_failure: Option<Error> = None;
        for service in ServiceName::ALL {
            if cancel.is_cancelled() {
                tracing::warn!("cancelled mid-reset; remaining restarts skipped");
                break;
            }
            if let Err(e) = adapter.request_restart(service).await {
                tracing::error!(%service, error = %e, "restart failed during reset");
                first_failure.get_or_insert(e);
            }
        }
        advance(&mut state, RunState::Restored);

        match first_failure {
            Some(e) => Err(e),
            None => Ok(RunReport {
                substrate,
                state,
                outcome: RunOutcome::CleanReset,
                validation: None,
                traffic: None,
            }),
        }
    }

    /// Read-only per-service listing: stored profile plus registry view.
    pub async fn status(&self) -> Result<Vec<ServiceStatus>, Error> {
        let substrate = self.detector.detect().await?;
        let adapter = adapter::for_substrate(substrate, &self.config, self.runner.clone());
        let store = adapter.store();
        let registry = ConsulClient::new(self.http.clone(), self.config.consul_url.clone());

        let lookups = ServiceName::ALL.map(|service| {
            let store = store.clone();
            let registry = &registry;
            async move {
                let (profile, health) =
                    tokio::join!(store.get(service), registry.service_health(service));
                profile.map(|profile| ServiceStatus {
                    service,
                    profile,
                    registry: health.ok(),
                })
            }
        });
        futures::future::try_join_all(lookups).await
    }

    /// The expectation a reset run would be validated against; exposed for
    /// the CLI's `--verify` reset flow.
    pub fn baseline_expectation(service: ServiceName) -> Expectation {
        Expectation::BaselineRestored {
            service,
            max_error_rate: BASELINE_ERROR_CEILING,
        }
    }

    pub fn validator(&self) -> &HealthValidator {
        &self.validator
    }
}

fn advance(state: &mut RunState, to: RunState) {
    tracing::info!(from = %state, to = %to, "state transition");
    *state = to;
}

/// Scoped restore: resets all fault profiles to baseline and restarts the
/// touched services, exactly once, on whichever exit path reaches it
/// first. Failures are logged and swallowed — cleanup must never prevent
/// the process from exiting or mask the run's own result.
struct RestoreGuard {
    adapter: Arc<dyn BackendAdapter>,
    done: AtomicBool,
}

impl RestoreGuard {
    fn new(adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            adapter,
            done: AtomicBool::new(false),
        }
    }

    async fn restore(&self, touched: &[ServiceName]) {
        if self.done.swap(true, Ordering::SeqCst) {
            // A second caller lost the race; restoration already ran.
            return;
        }

        tracing::info!("restoring baseline fault parameters");
        match self.adapter.store().reset_all().await {
            Err(e) => {
                // Skip the restarts: recreating units against a store that
                // failed to reset would re-materialize the fault.
                tracing::error!(error = %e, "baseline reset failed; restarts skipped");
            }
            Ok(()) => {
                for service in touched {
                    if let Err(e) = self.adapter.request_restart(*service).await {
                        tracing::error!(%service, error = %e, "restart failed during restore");
                    }
                }
            }
        }
    }
}
