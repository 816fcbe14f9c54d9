//! Shared fixtures: a scripted command runner standing in for the
//! substrate tooling, and config/mock builders pointing the controller
//! at wiremock backends.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use meshfault_core::MeshfaultConfig;
use meshfault_core::runner::{CommandError, CommandOutput, CommandRunner};

/// One scripted response: matches a program plus an argument token.
struct Rule {
    program: &'static str,
    needle: &'static str,
    output: CommandOutput,
}

/// Command runner replaying scripted outputs and recording every call.
/// Programs with no matching rule behave as missing from PATH.
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rule(mut self, program: &'static str, needle: &'static str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            program,
            needle,
            output,
        });
        self
    }

    /// Calls whose rendered command line contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let rendered = format!("{program} {}", args.join(" "));
        self.calls.lock().expect("lock").push(rendered.clone());

        // Match the needle against whole whitespace-delimited argument
        // tokens rather than a raw substring: otherwise a needle like "ps"
        // spuriously matches flags such as "--no-deps".
        self.rules
            .iter()
            .find(|rule| {
                rule.program == program && args.iter().any(|arg| *arg == rule.needle)
            })
            .map(|rule| rule.output.clone())
            .ok_or_else(|| CommandError::NotFound {
                program: program.to_string(),
            })
    }
}

pub fn exit_ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn exit_err(stderr: &str) -> CommandOutput {
    CommandOutput {
        code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// A runner scripted for a healthy compose substrate.
pub fn compose_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .rule("docker", "ps", exit_ok("web\napi\npayments\n"))
        .rule("docker", "up", exit_ok(""))
}

fn mock_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).expect("mock server URL")
}

/// Config wired to the given mock backends, tuned for fast test polling.
pub fn test_config(
    consul: &MockServer,
    prometheus: &MockServer,
    loki: &MockServer,
    frontend: &MockServer,
    fault_env_file: &Path,
) -> MeshfaultConfig {
    MeshfaultConfig {
        consul_url: mock_url(consul),
        prometheus_url: mock_url(prometheus),
        loki_url: mock_url(loki),
        frontend_url: mock_url(frontend),
        fault_env_file: fault_env_file.to_path_buf(),
        poll_interval: Duration::from_millis(50),
        validation_timeout: Duration::from_secs(5),
        http_timeout: Duration::from_secs(2),
        command_timeout: Duration::from_secs(2),
        traffic_workers: 2,
        traffic_pacing: Duration::from_millis(10),
        ..MeshfaultConfig::default()
    }
}

/// Consul: every check for every service passing.
pub async fn mount_registry_passing(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_prefix("/v1/health/checks/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Status": "passing", "CheckID": "service:web"},
        ])))
        .mount(server)
        .await;
}

/// Prometheus: instant queries answer with a constant rate.
pub async fn mount_metrics_rate(server: &MockServer, rate: f64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prom_vector(rate)))
        .mount(server)
        .await;
}

/// Prometheus: the first `n` queries answer `before`, then `after`.
pub async fn mount_metrics_rate_then(server: &MockServer, before: f64, n: u64, after: f64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prom_vector(before)))
        .up_to_n_times(n)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(prom_vector(after)))
        .mount(server)
        .await;
}

pub fn prom_vector(rate: f64) -> serde_json::Value {
    json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [
                {"metric": {}, "value": [1700000000.0, rate.to_string()]}
            ]
        }
    })
}

/// Loki: range queries answer with a fixed batch of lines.
pub async fn mount_logs_lines(server: &MockServer, lines: &[&str]) {
    let values: Vec<serde_json::Value> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| json!([format!("170000000000000000{i}"), line]))
        .collect();
    Mock::given(method("GET"))
        .and(path("/loki/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "streams", "result": [{"stream": {}, "values": values}]}
        })))
        .mount(server)
        .await;
}

/// Frontend: all demo routes answer 200.
pub async fn mount_frontend_healthy(server: &MockServer) {
    for route in ["/", "/work", "/data", "/health"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(server)
            .await;
    }
}

fn path_prefix(prefix: &'static str) -> impl wiremock::Match {
    wiremock::matchers::path_regex(format!("^{prefix}").as_str())
}
