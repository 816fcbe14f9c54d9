//! Health validator against mocked backends: bounded polling, graceful
//! degradation, and the fault-visibility scenarios.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::MockServer;

use meshfault_core::Error;
use meshfault_core::ServiceName;
use meshfault_core::backends::{ConsulClient, LokiClient, PrometheusClient};
use meshfault_core::validator::{Expectation, HealthValidator};

use super::common;

const TEST_QUERY: &str = "error_ratio{service=\"{service}\"}";

fn validator_for(consul: &MockServer, prometheus: &MockServer, loki_url: Url) -> HealthValidator {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("http client");
    HealthValidator::new(
        ConsulClient::new(
            http.clone(),
            Url::parse(&format!("{}/", consul.uri())).expect("consul url"),
        ),
        PrometheusClient::new(
            http.clone(),
            Url::parse(&format!("{}/", prometheus.uri())).expect("prometheus url"),
            TEST_QUERY.to_string(),
        ),
        LokiClient::new(http, loki_url),
        Duration::from_millis(50),
        Duration::from_secs(60),
    )
}

fn loki_url_of(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).expect("loki url")
}

/// A port from the discard range: connections are refused immediately.
fn unreachable_url() -> Url {
    Url::parse("http://127.0.0.1:9/").expect("static url")
}

#[tokio::test]
async fn fault_becomes_visible_after_a_few_polls() {
    let consul = MockServer::start().await;
    let prometheus = MockServer::start().await;
    let loki = MockServer::start().await;
    common::mount_registry_passing(&consul).await;
    common::mount_metrics_rate_then(&prometheus, 0.0, 2, 0.3).await;
    common::mount_logs_lines(&loki, &["GET /work 200", "GET /work 500 injected error"]).await;

    let validator = validator_for(&consul, &prometheus, loki_url_of(&loki));
    let expectation = Expectation::FaultActive {
        service: ServiceName::Payments,
        min_error_rate: 0.15,
    };

    let validation = validator
        .poll(&expectation, Duration::from_secs(10), &CancellationToken::new())
        .await
        .expect("poll");

    assert!(validation.satisfied);
    assert_eq!(validation.ticks, 3);
    let metrics = validation.snapshot.metrics.expect("metrics sample");
    assert!((metrics.error_rate - 0.3).abs() < f64::EPSILON);
    let logs = validation.snapshot.logs.expect("log sample");
    assert_eq!(logs.lines, 2);
    assert_eq!(logs.error_lines, 1);
}

#[tokio::test]
async fn poll_returns_within_budget_when_never_satisfied() {
    let consul = MockServer::start().await;
    let prometheus = MockServer::start().await;
    let loki = MockServer::start().await;
    common::mount_registry_passing(&consul).await;
    common::mount_metrics_rate(&prometheus, 0.0).await;
    common::mount_logs_lines(&loki, &[]).await;

    let validator = validator_for(&consul, &prometheus, loki_url_of(&loki));
    let expectation = Expectation::FaultActive {
        service: ServiceName::Api,
        min_error_rate: 0.5,
    };

    let started = Instant::now();
    let validation = validator
        .poll(&expectation, Duration::from_millis(300), &CancellationToken::new())
        .await
        .expect("poll");

    assert!(!validation.satisfied);
    // Bounded: well within budget + one in-flight tick.
    assert!(started.elapsed() < Duration::from_secs(3));
    // The last snapshot is still handed back for reporting.
    assert!(validation.snapshot.metrics.is_some());
}

#[tokio::test]
async fn unreachable_log_backend_degrades_to_partial() {
    let consul = MockServer::start().await;
    let prometheus = MockServer::start().await;
    common::mount_registry_passing(&consul).await;
    common::mount_metrics_rate(&prometheus, 0.4).await;

    let validator = validator_for(&consul, &prometheus, unreachable_url());
    let expectation = Expectation::FaultActive {
        service: ServiceName::Payments,
        min_error_rate: 0.2,
    };

    let validation = validator
        .poll(&expectation, Duration::from_secs(5), &CancellationToken::new())
        .await
        .expect("poll");

    // The metrics evidence alone satisfies the expectation; the dead log
    // backend only degrades the snapshot.
    assert!(validation.satisfied);
    assert!(validation.snapshot.logs.is_none());
    assert!(validation.snapshot.is_partial());
}

#[tokio::test]
async fn cancellation_aborts_the_poll_immediately() {
    let consul = MockServer::start().await;
    let prometheus = MockServer::start().await;
    let loki = MockServer::start().await;
    common::mount_registry_passing(&consul).await;
    common::mount_metrics_rate(&prometheus, 0.0).await;
    common::mount_logs_lines(&loki, &[]).await;

    let validator = validator_for(&consul, &prometheus, loki_url_of(&loki));
    let expectation = Expectation::FaultActive {
        service: ServiceName::Web,
        min_error_rate: 0.9,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = validator
        .poll(&expectation, Duration::from_secs(60), &cancel)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn total_failure_injection_is_not_a_backend_error() {
    // error_rate=1.0 repeatedly (the circuit-breaker demo): the metrics
    // backend reports a full outage, which must read as a satisfied
    // expectation, never as BackendUnreachable.
    let consul = MockServer::start().await;
    let prometheus = MockServer::start().await;
    let loki = MockServer::start().await;
    common::mount_registry_passing(&consul).await;
    common::mount_metrics_rate(&prometheus, 1.0).await;
    common::mount_logs_lines(&loki, &["upstream error", "upstream error"]).await;

    let validator = validator_for(&consul, &prometheus, loki_url_of(&loki));
    let expectation = Expectation::FaultActive {
        service: ServiceName::Payments,
        min_error_rate: 0.5,
    };

    for _round in 0..3 {
        let validation = validator
            .poll(&expectation, Duration::from_secs(5), &CancellationToken::new())
            .await
            .expect("poll");
        assert!(validation.satisfied);
        assert!(!validation.snapshot.is_partial());
    }
}
