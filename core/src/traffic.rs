//! Demo traffic generation.
//!
//! Validation needs request volume: the metrics and log backends only
//! show an injected fault once the mesh is serving traffic. A fixed-size
//! pool of workers drives the demo frontend's routes until a shared
//! deadline or cancellation, then reports aggregate outcome counts.

use std::time::Duration;

use meshfault_async_utils::OrCancelExt;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Frontend routes exercised by the workers; `/work` fans out across the
/// mesh tiers, `/` and `/data` keep the frontend itself busy.
const ROUTES: [&str; 3] = ["", "work", "data"];

/// Aggregate outcome counts for one traffic run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficReport {
    pub requests: u64,
    /// 2xx responses.
    pub ok: u64,
    /// 5xx responses — the signal an injected fault produces.
    pub server_errors: u64,
    /// Non-2xx, non-5xx responses.
    pub other: u64,
    /// Requests that never produced a response.
    pub transport_errors: u64,
}

impl TrafficReport {
    fn absorb(&mut self, other: TrafficReport) {
        self.requests += other.requests;
        self.ok += other.ok;
        self.server_errors += other.server_errors;
        self.other += other.other;
        self.transport_errors += other.transport_errors;
    }
}

pub struct TrafficGenerator {
    http: reqwest::Client,
    frontend: Url,
    workers: usize,
    pacing: Duration,
}

impl TrafficGenerator {
    pub fn new(http: reqwest::Client, frontend: Url, workers: usize, pacing: Duration) -> Self {
        Self {
            http,
            frontend,
            workers,
            pacing,
        }
    }

    /// Drive the frontend until `deadline` or cancellation.
    ///
    /// Workers are cooperative: they share the deadline and token, finish
    /// their in-flight request, and stop as a group. The per-request HTTP
    /// timeout on the shared client bounds how long "in-flight" can be.
    pub async fn drive(&self, deadline: Instant, cancel: &CancellationToken) -> TrafficReport {
        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let http = self.http.clone();
            let frontend = self.frontend.clone();
            let token = cancel.clone();
            let pacing = self.pacing;
            handles.push(tokio::spawn(async move {
                worker_loop(worker, http, frontend, pacing, deadline, token).await
            }));
        }

        let mut report = TrafficReport::default();
        for handle in handles {
            match handle.await {
                Ok(worker_report) => report.absorb(worker_report),
                Err(e) => tracing::warn!(error = %e, "traffic worker panicked"),
            }
        }
        tracing::info!(
            requests = report.requests,
            server_errors = report.server_errors,
            "traffic run finished"
        );
        report
    }
}

async fn worker_loop(
    worker: usize,
    http: reqwest::Client,
    frontend: Url,
    pacing: Duration,
    deadline: Instant,
    cancel: CancellationToken,
) -> TrafficReport {
    let mut report = TrafficReport::default();

    loop {
        if cancel.is_cancelled() || Instant::now() >= deadline {
            break;
        }

        let route = ROUTES[rand::rng().random_range(0..ROUTES.len())];
        let url = match frontend.join(route) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(worker, route, error = %e, "skipping unbuildable route");
                break;
            }
        };

        report.requests += 1;
        match http.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    report.ok += 1;
                } else if status.is_server_error() {
                    report.server_errors += 1;
                } else {
                    report.other += 1;
                }
            }
            Err(e) => {
                tracing::debug!(worker, error = %e, "request failed in transport");
                report.transport_errors += 1;
            }
        }

        // Pace the next request; stop instantly on cancel or deadline.
        if tokio::time::sleep(pacing)
            .or_cancel_at(&cancel, deadline)
            .await
            .is_err()
        {
            break;
        }
    }

    report
}
