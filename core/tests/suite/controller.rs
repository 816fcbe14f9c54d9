//! End-to-end controller runs against a scripted substrate and mocked
//! backends: the happy path, adapter failure, cancellation, and the
//! restore-to-baseline guarantee behind all of them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use meshfault_core::controller::InjectOptions;
use meshfault_core::store::{EnvFileStore, FaultStore};
use meshfault_core::{Controller, Error, FaultProfile, RunOutcome, ServiceName};

use super::common::{self, ScriptedRunner};

struct Stack {
    consul: MockServer,
    prometheus: MockServer,
    loki: MockServer,
    frontend: MockServer,
    dir: TempDir,
}

impl Stack {
    async fn start() -> Self {
        Self {
            consul: MockServer::start().await,
            prometheus: MockServer::start().await,
            loki: MockServer::start().await,
            frontend: MockServer::start().await,
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    fn env_file(&self) -> std::path::PathBuf {
        self.dir.path().join("fault.env")
    }

    fn controller(&self, runner: Arc<ScriptedRunner>) -> Controller {
        let config = common::test_config(
            &self.consul,
            &self.prometheus,
            &self.loki,
            &self.frontend,
            &self.env_file(),
        );
        Controller::new(config, runner).expect("controller")
    }

    async fn stored_profile(&self, service: ServiceName) -> FaultProfile {
        EnvFileStore::new(self.env_file())
            .get(service)
            .await
            .expect("stored profile")
    }
}

fn faulty_profile() -> FaultProfile {
    FaultProfile::new(
        0.3,
        Duration::from_millis(50),
        Duration::from_millis(100),
        Duration::from_millis(200),
    )
    .expect("valid profile")
}

#[tokio::test]
async fn inject_validates_then_restores_baseline() {
    let stack = Stack::start().await;
    common::mount_registry_passing(&stack.consul).await;
    // One zero-rate tick first so the traffic pool has a full poll
    // interval to issue requests before validation succeeds.
    common::mount_metrics_rate_then(&stack.prometheus, 0.0, 1, 0.3).await;
    common::mount_logs_lines(&stack.loki, &["GET /work 500 injected error"]).await;
    common::mount_frontend_healthy(&stack.frontend).await;

    let runner = Arc::new(common::compose_runner());
    let controller = stack.controller(runner.clone());

    let report = controller
        .inject(
            ServiceName::Payments,
            faulty_profile(),
            InjectOptions { traffic: true },
            &CancellationToken::new(),
        )
        .await
        .expect("inject");

    assert_eq!(report.outcome, RunOutcome::Validated);
    let validation = report.validation.expect("validation");
    assert!(validation.satisfied);
    let traffic = report.traffic.expect("traffic report");
    assert!(traffic.requests > 0);

    // The terminal action restored baseline for every service.
    for service in ServiceName::ALL {
        assert!(stack.stored_profile(service).await.is_baseline());
    }
    // Two recreates of the faulted unit: one to apply, one to restore.
    assert_eq!(runner.calls_matching("up -d --force-recreate --no-deps payments"), 2);
}

#[tokio::test]
async fn adapter_failure_skips_validation_but_still_restores() {
    let stack = Stack::start().await;
    let runner = Arc::new(
        ScriptedRunner::new()
            .rule("docker", "ps", common::exit_ok("web\n"))
            .rule("docker", "up", common::exit_err("no such service: payments")),
    );
    let controller = stack.controller(runner.clone());

    let err = controller
        .inject(
            ServiceName::Payments,
            faulty_profile(),
            InjectOptions { traffic: false },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RestartFailed { .. }));
    // Cleanup still reset the store even though every restart failed.
    assert!(stack.stored_profile(ServiceName::Payments).await.is_baseline());
}

#[tokio::test]
async fn cancel_mid_propagation_ends_restored_at_baseline() {
    let stack = Stack::start().await;
    common::mount_registry_passing(&stack.consul).await;
    // Never satisfies: observed rate stays at zero.
    common::mount_metrics_rate(&stack.prometheus, 0.0).await;
    common::mount_logs_lines(&stack.loki, &[]).await;
    common::mount_frontend_healthy(&stack.frontend).await;

    let runner = Arc::new(common::compose_runner());
    let mut config = common::test_config(
        &stack.consul,
        &stack.prometheus,
        &stack.loki,
        &stack.frontend,
        &stack.env_file(),
    );
    config.validation_timeout = Duration::from_secs(60);
    let controller = Controller::new(config, runner.clone()).expect("controller");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let report = controller
        .inject(
            ServiceName::Payments,
            faulty_profile(),
            InjectOptions { traffic: true },
            &cancel,
        )
        .await
        .expect("inject");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    // Cancellation fell through to restore, not a dangling wait.
    assert!(started.elapsed() < Duration::from_secs(10));
    for service in ServiceName::ALL {
        assert!(stack.stored_profile(service).await.is_baseline());
    }
}

#[tokio::test]
async fn cancel_before_apply_still_restores() {
    let stack = Stack::start().await;
    let runner = Arc::new(common::compose_runner());
    let controller = stack.controller(runner.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = controller
        .inject(
            ServiceName::Web,
            faulty_profile(),
            InjectOptions { traffic: false },
            &cancel,
        )
        .await
        .expect("inject");

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(stack.stored_profile(ServiceName::Web).await.is_baseline());
}

#[tokio::test]
async fn reset_restores_and_restarts_every_service() {
    let stack = Stack::start().await;
    let runner = Arc::new(common::compose_runner());

    // Seed a non-baseline profile first.
    let store = EnvFileStore::new(stack.env_file());
    store
        .set(ServiceName::Currency, &faulty_profile())
        .await
        .expect("seed");

    let controller = stack.controller(runner.clone());
    let report = controller
        .reset(&CancellationToken::new())
        .await
        .expect("reset");

    assert_eq!(report.outcome, RunOutcome::CleanReset);
    for service in ServiceName::ALL {
        assert!(stack.stored_profile(service).await.is_baseline());
    }
    assert_eq!(
        runner.calls_matching("up -d --force-recreate"),
        ServiceName::ALL.len()
    );
}

#[tokio::test]
async fn reset_twice_is_idempotent() {
    let stack = Stack::start().await;
    let runner = Arc::new(common::compose_runner());
    let controller = stack.controller(runner);

    controller
        .reset(&CancellationToken::new())
        .await
        .expect("first reset");
    let after_once = tokio::fs::read_to_string(stack.env_file())
        .await
        .expect("read");

    controller
        .reset(&CancellationToken::new())
        .await
        .expect("second reset");
    let after_twice = tokio::fs::read_to_string(stack.env_file())
        .await
        .expect("read");

    assert_eq!(after_once, after_twice);
}

#[tokio::test]
async fn unknown_substrate_reports_guidance_without_mutating() {
    let stack = Stack::start().await;
    // No rules at all: neither docker nor kubectl exists.
    let runner = Arc::new(ScriptedRunner::new());
    let controller = stack.controller(runner);

    let err = controller
        .inject(
            ServiceName::Payments,
            faulty_profile(),
            InjectOptions { traffic: false },
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SubstrateUnknown));
    assert!(err.to_string().contains("docker compose up"));
    // Nothing was mutated: the fault env file was never created.
    assert!(!stack.env_file().exists());
}
