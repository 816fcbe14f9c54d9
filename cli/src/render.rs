//! Human and JSON rendering of controller results.
//!
//! Human output goes to stdout in fixed-width tables; `--json` swaps in
//! pretty-printed JSON of the same data, suitable for scripting.

use meshfault_core::controller::{RunReport, ServiceStatus};
use meshfault_core::doctor::DoctorReport;
use meshfault_core::validator::Validation;
use meshfault_core::Error;

pub fn run_report(report: &RunReport, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("substrate: {}", report.substrate);
    println!("outcome:   {}", report.outcome);
    if let Some(validation) = &report.validation {
        println!(
            "validated: {} after {} poll(s) ({:.1}s)",
            if validation.satisfied { "yes" } else { "no" },
            validation.ticks,
            validation.elapsed.as_secs_f64(),
        );
        if let Some(metrics) = validation.snapshot.metrics {
            println!("observed error rate: {:.3}", metrics.error_rate);
        }
        if validation.snapshot.is_partial() {
            println!("note: one or more backends were unreachable; snapshot is partial");
        }
    }
    if let Some(traffic) = &report.traffic {
        println!(
            "traffic:   {} requests ({} ok, {} server errors, {} transport errors)",
            traffic.requests, traffic.ok, traffic.server_errors, traffic.transport_errors,
        );
    }
    println!("state:     {}", report.state);
    Ok(())
}

pub fn validation(validation: &Validation, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(validation)?);
        return Ok(());
    }
    println!(
        "baseline verified: {} after {} poll(s) ({:.1}s)",
        if validation.satisfied { "yes" } else { "no" },
        validation.ticks,
        validation.elapsed.as_secs_f64(),
    );
    Ok(())
}

pub fn statuses(statuses: &[ServiceStatus], json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(statuses)?);
        return Ok(());
    }

    println!(
        "{:<10} {:>10} {:>9} {:>9} {:>9}  {}",
        "SERVICE", "ERROR RATE", "P50", "P90", "P99", "REGISTRY"
    );
    for status in statuses {
        let registry = match &status.registry {
            None => "unreachable".to_string(),
            Some(health) if health.is_passing() => "passing".to_string(),
            Some(health) => format!("{}/{} passing", health.checks_passing, health.checks_total),
        };
        println!(
            "{:<10} {:>10.3} {:>7}ms {:>7}ms {:>7}ms  {}",
            status.service,
            status.profile.error_rate,
            status.profile.latency_p50.as_millis(),
            status.profile.latency_p90.as_millis(),
            status.profile.latency_p99.as_millis(),
            registry,
        );
    }
    Ok(())
}

pub fn doctor(report: &DoctorReport, json: bool) -> Result<(), Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for probe in &report.probes {
        println!(
            "{:<10} {}  {}",
            probe.target,
            if probe.ok { "ok " } else { "FAIL" },
            probe.detail,
        );
    }
    if !report.all_ok() {
        println!("\nstack is not fully reachable; see failures above");
    }
    Ok(())
}
