//! Layered controller configuration.
//!
//! Three layers with later layers winning:
//! 1. Hardcoded defaults matching the local demo stack's ports.
//! 2. An optional TOML file (`meshfault.toml`, or `--config`).
//! 3. `MESHFAULT_*` environment variables.
//!
//! Invalid values are reported with the field or variable name and the
//! expected shape; the controller never starts with a half-parsed config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::Error;

/// Default PromQL template for the observed 5xx ratio of one service.
/// `{service}` is replaced with the service name.
const DEFAULT_ERROR_RATE_QUERY: &str = "sum(rate(envoy_cluster_upstream_rq_xx{envoy_cluster_name=\"{service}\",envoy_response_code_class=\"5\"}[1m])) / sum(rate(envoy_cluster_upstream_rq_xx{envoy_cluster_name=\"{service}\"}[1m]))";

/// Fully resolved controller configuration.
#[derive(Debug, Clone)]
pub struct MeshfaultConfig {
    pub consul_url: Url,
    pub prometheus_url: Url,
    pub loki_url: Url,
    /// Base URL of the demo frontend the traffic generator drives.
    pub frontend_url: Url,
    /// Compose-substrate fault env file.
    pub fault_env_file: PathBuf,
    /// Cluster-substrate namespace holding the demo deployments.
    pub kube_namespace: String,
    /// Validator poll interval. The metrics backend scrapes on the order
    /// of 15s; polling much faster than that yields no new information.
    pub poll_interval: Duration,
    /// Overall validation budget per run.
    pub validation_timeout: Duration,
    /// Per-request HTTP timeout for backend queries and traffic.
    pub http_timeout: Duration,
    /// Per-command budget for substrate tooling subprocesses.
    pub command_timeout: Duration,
    /// Trailing window for log-backend queries.
    pub log_window: Duration,
    /// PromQL template for the per-service 5xx ratio.
    pub error_rate_query: String,
    /// Traffic generator pool size.
    pub traffic_workers: usize,
    /// Pacing interval between requests per traffic worker.
    pub traffic_pacing: Duration,
}

impl Default for MeshfaultConfig {
    fn default() -> Self {
        Self {
            consul_url: demo_url("http://127.0.0.1:8500/"),
            prometheus_url: demo_url("http://127.0.0.1:9090/"),
            loki_url: demo_url("http://127.0.0.1:3100/"),
            frontend_url: demo_url("http://127.0.0.1:8080/"),
            fault_env_file: PathBuf::from("fault.env"),
            kube_namespace: "default".to_string(),
            poll_interval: Duration::from_secs(5),
            validation_timeout: Duration::from_secs(90),
            http_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(30),
            log_window: Duration::from_secs(60),
            error_rate_query: DEFAULT_ERROR_RATE_QUERY.to_string(),
            traffic_workers: 4,
            traffic_pacing: Duration::from_millis(200),
        }
    }
}

fn demo_url(raw: &str) -> Url {
    // Only called with known-good literals above.
    #[allow(clippy::expect_used)]
    Url::parse(raw).expect("default URL literal")
}

/// TOML overlay: every field optional, absent fields keep the prior layer.
#[derive(Debug, Default, Deserialize)]
struct FileOverlay {
    consul_url: Option<Url>,
    prometheus_url: Option<Url>,
    loki_url: Option<Url>,
    frontend_url: Option<Url>,
    fault_env_file: Option<PathBuf>,
    kube_namespace: Option<String>,
    poll_interval_secs: Option<u64>,
    validation_timeout_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    log_window_secs: Option<u64>,
    error_rate_query: Option<String>,
    traffic_workers: Option<usize>,
    traffic_pacing_ms: Option<u64>,
}

/// Builder applying the three layers.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: "MESHFAULT".to_string(),
        }
    }

    /// Use an explicit config file. Without this, `meshfault.toml` in the
    /// working directory is used when present.
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    #[cfg(test)]
    fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.to_string();
        self
    }

    pub fn load(&self) -> Result<MeshfaultConfig, Error> {
        let mut config = MeshfaultConfig::default();
        self.apply_file(&mut config)?;
        self.apply_env(&mut config)?;
        if config.traffic_workers == 0 {
            return Err(Error::Config {
                message: "traffic_workers must be at least 1".to_string(),
            });
        }
        Ok(config)
    }

    fn apply_file(&self, config: &mut MeshfaultConfig) -> Result<(), Error> {
        let path = match &self.file {
            Some(path) => path.clone(),
            None => {
                let implicit = Path::new("meshfault.toml");
                if !implicit.exists() {
                    return Ok(());
                }
                implicit.to_path_buf()
            }
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| Error::Config {
            message: format!("reading {}: {e}", path.display()),
        })?;
        let overlay: FileOverlay = toml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("parsing {}: {e}", path.display()),
        })?;

        apply_overlay(config, overlay);
        Ok(())
    }

    fn apply_env(&self, config: &mut MeshfaultConfig) -> Result<(), Error> {
        config.consul_url = self.env_url("CONSUL_URL", &config.consul_url)?;
        config.prometheus_url = self.env_url("PROMETHEUS_URL", &config.prometheus_url)?;
        config.loki_url = self.env_url("LOKI_URL", &config.loki_url)?;
        config.frontend_url = self.env_url("FRONTEND_URL", &config.frontend_url)?;
        if let Some(path) = self.env_raw("FAULT_ENV_FILE") {
            config.fault_env_file = PathBuf::from(path);
        }
        if let Some(ns) = self.env_raw("KUBE_NAMESPACE") {
            config.kube_namespace = ns;
        }
        config.poll_interval =
            self.env_secs("POLL_INTERVAL_SECS", config.poll_interval)?;
        config.validation_timeout =
            self.env_secs("VALIDATION_TIMEOUT_SECS", config.validation_timeout)?;
        config.http_timeout = self.env_secs("HTTP_TIMEOUT_SECS", config.http_timeout)?;
        config.command_timeout = self.env_secs("COMMAND_TIMEOUT_SECS", config.command_timeout)?;
        config.log_window = self.env_secs("LOG_WINDOW_SECS", config.log_window)?;
        if let Some(query) = self.env_raw("ERROR_RATE_QUERY") {
            config.error_rate_query = query;
        }
        if let Some(raw) = self.env_raw("TRAFFIC_WORKERS") {
            config.traffic_workers = raw.parse().map_err(|_| self.bad_env("TRAFFIC_WORKERS", &raw, "a positive integer"))?;
        }
        if let Some(raw) = self.env_raw("TRAFFIC_PACING_MS") {
            let ms: u64 = raw
                .parse()
                .map_err(|_| self.bad_env("TRAFFIC_PACING_MS", &raw, "integer milliseconds"))?;
            config.traffic_pacing = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn env_raw(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{name}", self.env_prefix)).ok()
    }

    fn env_url(&self, name: &str, current: &Url) -> Result<Url, Error> {
        match self.env_raw(name) {
            None => Ok(current.clone()),
            Some(raw) => Url::parse(&raw).map_err(|_| self.bad_env(name, &raw, "an absolute URL")),
        }
    }

    fn env_secs(&self, name: &str, current: Duration) -> Result<Duration, Error> {
        match self.env_raw(name) {
            None => Ok(current),
            Some(raw) => raw
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| self.bad_env(name, &raw, "integer seconds")),
        }
    }

    fn bad_env(&self, name: &str, value: &str, expected: &str) -> Error {
        Error::Config {
            message: format!(
                "invalid value for ${}_{name}: {value:?} (expected {expected})",
                self.env_prefix
            ),
        }
    }
}

fn apply_overlay(config: &mut MeshfaultConfig, overlay: FileOverlay) {
    if let Some(v) = overlay.consul_url {
        config.consul_url = v;
    }
    if let Some(v) = overlay.prometheus_url {
        config.prometheus_url = v;
    }
    if let Some(v) = overlay.loki_url {
        config.loki_url = v;
    }
    if let Some(v) = overlay.frontend_url {
        config.frontend_url = v;
    }
    if let Some(v) = overlay.fault_env_file {
        config.fault_env_file = v;
    }
    if let Some(v) = overlay.kube_namespace {
        config.kube_namespace = v;
    }
    if let Some(v) = overlay.poll_interval_secs {
        config.poll_interval = Duration::from_secs(v);
    }
    if let Some(v) = overlay.validation_timeout_secs {
        config.validation_timeout = Duration::from_secs(v);
    }
    if let Some(v) = overlay.http_timeout_secs {
        config.http_timeout = Duration::from_secs(v);
    }
    if let Some(v) = overlay.command_timeout_secs {
        config.command_timeout = Duration::from_secs(v);
    }
    if let Some(v) = overlay.log_window_secs {
        config.log_window = Duration::from_secs(v);
    }
    if let Some(v) = overlay.error_rate_query {
        config.error_rate_query = v;
    }
    if let Some(v) = overlay.traffic_workers {
        config.traffic_workers = v;
    }
    if let Some(v) = overlay.traffic_pacing_ms {
        config.traffic_pacing = Duration::from_millis(v);
    }
}
