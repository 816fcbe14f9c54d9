//! Bounded readiness polling.
//!
//! A poll loop that repeatedly observes some external condition at a fixed
//! interval until it is ready or a hard deadline elapses. The loop never
//! blocks past its budget and always hands back the last observation, ready
//! or not — the caller decides what a non-ready final observation means.
//!
//! The health validator drives this with live backend probes; tests drive
//! it with scripted probes under `tokio::time::pause`.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Interval/budget pair for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPlan {
    interval: Duration,
    budget: Duration,
}

/// Invalid poll plan parameters.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("poll interval must be nonzero")]
    ZeroInterval,
}

impl PollPlan {
    /// Build a plan polling every `interval` for at most `budget`.
    ///
    /// A zero budget is allowed and yields exactly one observation.
    pub fn new(interval: Duration, budget: Duration) -> Result<Self, PlanError> {
        if interval.is_zero() {
            return Err(PlanError::ZeroInterval);
        }
        Ok(Self { interval, budget })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

/// One pollable condition.
///
/// `observe` performs the (possibly expensive) probe; `is_ready` judges the
/// result without side effects. Observations must be self-contained: the
/// loop returns the last one as its final answer.
#[async_trait]
pub trait Probe: Send {
    type Observation: Send;

    async fn observe(&mut self) -> Self::Observation;

    fn is_ready(&self, observation: &Self::Observation) -> bool;
}

/// Outcome of a bounded poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<T> {
    /// The last observation made, whether or not it was ready.
    pub last: T,
    /// Whether the last observation satisfied the probe.
    pub ready: bool,
    /// Number of observations made (always at least one).
    pub ticks: u32,
    /// Wall time spent in the loop.
    pub elapsed: Duration,
}

/// Poll `probe` per `plan` until ready or out of budget.
///
/// At least one observation is always made, so a zero budget degrades to a
/// single probe. Sleeps are clamped to the remaining budget; an in-flight
/// observation is never aborted (external probes carry their own I/O
/// timeouts), which is where the loop's `+ ε` tolerance comes from.
pub async fn poll_until_ready<P: Probe>(plan: &PollPlan, probe: &mut P) -> PollOutcome<P::Observation> {
    let started = Instant::now();
    let deadline = started + plan.budget();
    let mut ticks = 0u32;

    loop {
        let observation = probe.observe().await;
        ticks += 1;
        let ready = probe.is_ready(&observation);
        let now = Instant::now();

        if ready || now >= deadline {
            return PollOutcome {
                last: observation,
                ready,
                ticks,
                elapsed: now - started,
            };
        }

        let sleep_for = plan.interval().min(deadline - now);
        tracing::trace!(tick = ticks, sleep_ms = sleep_for.as_millis() as u64, "poll not ready");
        tokio::time::sleep(sleep_for).await;
    }
}
