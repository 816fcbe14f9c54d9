//! Traffic pool behavior: outcome accounting and cooperative shutdown.

use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meshfault_core::traffic::TrafficGenerator;

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("http client")
}

fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).expect("frontend url")
}

#[tokio::test]
async fn counts_successes_and_server_errors() {
    let frontend = MockServer::start().await;
    for route in ["/", "/data"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&frontend)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/work"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "injected"})))
        .mount(&frontend)
        .await;

    let generator = TrafficGenerator::new(http(), base_url(&frontend), 3, Duration::from_millis(10));
    let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
    let report = generator.drive(deadline, &CancellationToken::new()).await;

    assert!(report.requests > 10);
    assert_eq!(
        report.requests,
        report.ok + report.server_errors + report.other + report.transport_errors
    );
    // With ~3 workers cycling three routes for 400ms, both outcome
    // classes show up.
    assert!(report.ok > 0);
    assert!(report.server_errors > 0);
}

#[tokio::test]
async fn workers_stop_as_a_group_on_cancel() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&frontend)
        .await;

    let generator = TrafficGenerator::new(http(), base_url(&frontend), 4, Duration::from_millis(20));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let report = generator.drive(deadline, &cancel).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.requests > 0);
}

#[tokio::test]
async fn deadline_alone_stops_the_pool() {
    let frontend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&frontend)
        .await;

    let generator = TrafficGenerator::new(http(), base_url(&frontend), 2, Duration::from_millis(10));
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(200);
    let report = generator.drive(deadline, &CancellationToken::new()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.requests > 0);
}
