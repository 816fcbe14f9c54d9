//! `meshfault` entry point.
//!
//! Operator CLI for the demo mesh's fault-injection controller.
//!
//! ## Commands
//!
//! - `meshfault inject --service payments --error-rate 0.3 --latency 250ms`
//! - `meshfault reset [--verify <service>]`
//! - `meshfault status`
//! - `meshfault doctor`
//!
//! ## Exit codes
//!
//! - 0: validated success, clean reset, or cancelled-and-restored
//! - 1: no substrate detected / doctor found the stack down
//! - 2: adapter or store failure (fault state already restored)
//! - 3: validation timed out (reported, fault already restored)

mod render;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use meshfault_core::controller::InjectOptions;
use meshfault_core::{ConfigLoader, Controller, Error, FaultProfile, RunOutcome, ServiceName};
use meshfault_core::runner::ProcessRunner;

const EXIT_SUBSTRATE_UNKNOWN: u8 = 1;
const EXIT_ADAPTER_FAILURE: u8 = 2;
const EXIT_VALIDATION_TIMEOUT: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "meshfault", version, about = "Fault injection for the demo service mesh")]
struct Cli {
    /// Config file (default: ./meshfault.toml when present).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Inject a fault into one service, validate it propagated, restore.
    Inject(InjectArgs),
    /// Reset every service to the zero-fault baseline.
    Reset(ResetArgs),
    /// Show each service's stored fault profile and registry health.
    Status(StatusArgs),
    /// Probe the substrate and every observability backend.
    Doctor(DoctorArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
struct InjectArgs {
    /// Target service (web, api, payments, currency, cache, rates).
    #[arg(long = "service", short = 's')]
    service: ServiceName,

    /// Fraction of requests to fail, in [0, 1].
    #[arg(long = "error-rate", short = 'e', default_value_t = 0.0)]
    error_rate: f64,

    /// Added latency, median (e.g. 250ms, 1s).
    #[arg(long = "latency", default_value = "0ms", value_parser = parse_duration_arg)]
    latency: Duration,

    /// Added latency, 90th percentile (defaults to --latency).
    #[arg(long = "latency-p90", value_parser = parse_duration_arg)]
    latency_p90: Option<Duration>,

    /// Added latency, 99th percentile (defaults to --latency-p90).
    #[arg(long = "latency-p99", value_parser = parse_duration_arg)]
    latency_p99: Option<Duration>,

    /// Validation budget override (e.g. 120s).
    #[arg(long = "timeout", value_parser = parse_duration_arg)]
    timeout: Option<Duration>,

    /// Skip demo traffic generation during validation.
    #[arg(long = "no-traffic")]
    no_traffic: bool,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

#[derive(Debug, Parser)]
struct ResetArgs {
    /// After resetting, poll until this service reads baseline again.
    #[arg(long = "verify")]
    verify: Option<ServiceName>,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

#[derive(Debug, Parser)]
struct DoctorArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    json: bool,
}

/// Accepts `250ms`, `2s`, `1m`, or a bare integer (milliseconds).
fn parse_duration_arg(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => raw.split_at(split),
        None => (raw, "ms"),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{raw}' (expected e.g. 250ms, 2s, 1m)"))?;
    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        other => Err(format!("unknown duration unit '{other}' (use ms, s, or m)")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Operator interrupt cancels the shared token; the controller's
    // restore step still runs before exit.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling and restoring baseline");
            signal_token.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &Error) -> u8 {
    match error {
        Error::SubstrateUnknown => EXIT_SUBSTRATE_UNKNOWN,
        Error::ValidationTimedOut { .. } => EXIT_VALIDATION_TIMEOUT,
        _ => EXIT_ADAPTER_FAILURE,
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<ExitCode, Error> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path.clone());
    }
    let mut config = loader.load()?;

    match cli.command {
        Command::Inject(args) => {
            if let Some(timeout) = args.timeout {
                config.validation_timeout = timeout;
            }
            let runner = std::sync::Arc::new(ProcessRunner::new(config.command_timeout));
            let controller = Controller::new(config, runner)?;

            let p50 = args.latency;
            let p90 = args.latency_p90.unwrap_or(p50);
            let p99 = args.latency_p99.unwrap_or(p90);
            let profile = FaultProfile::new(args.error_rate, p50, p90, p99)?;

            let report = controller
                .inject(
                    args.service,
                    profile,
                    InjectOptions {
                        traffic: !args.no_traffic,
                    },
                    cancel,
                )
                .await?;

            render::run_report(&report, args.json)?;
            Ok(match report.outcome {
                RunOutcome::TimedOut => ExitCode::from(EXIT_VALIDATION_TIMEOUT),
                _ => ExitCode::SUCCESS,
            })
        }
        Command::Reset(args) => {
            let runner = std::sync::Arc::new(ProcessRunner::new(config.command_timeout));
            let validation_timeout = config.validation_timeout;
            let controller = Controller::new(config, runner)?;

            let report = controller.reset(cancel).await?;
            render::run_report(&report, args.json)?;

            if let Some(service) = args.verify {
                let expectation = Controller::baseline_expectation(service);
                let validation = controller
                    .validator()
                    .poll(&expectation, validation_timeout, cancel)
                    .await?;
                render::validation(&validation, args.json)?;
                if !validation.satisfied {
                    return Err(Error::ValidationTimedOut {
                        waited: validation.elapsed,
                    });
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status(args) => {
            let runner = std::sync::Arc::new(ProcessRunner::new(config.command_timeout));
            let controller = Controller::new(config, runner)?;
            let statuses = controller.status().await?;
            render::statuses(&statuses, args.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Doctor(args) => {
            let runner = std::sync::Arc::new(ProcessRunner::new(config.command_timeout));
            let report = meshfault_core::doctor::run(&config, runner).await?;
            render::doctor(&report, args.json)?;
            Ok(if report.all_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_SUBSTRATE_UNKNOWN)
            })
        }
    }
}
