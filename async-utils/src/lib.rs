//! Async utilities for cancellation- and deadline-aware futures.
//!
//! The orchestration controller races every blocking operation (backend
//! polls, restart requests, traffic issuance) against both an operator
//! cancellation token and a hard deadline. `OrCancelExt` provides the
//! combinators; no operation in this workspace may block unboundedly.

use async_trait::async_trait;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a raced future did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    /// The cancellation token fired first.
    Cancelled,
    /// The deadline elapsed first.
    DeadlineElapsed,
}

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupted::Cancelled => write!(f, "cancelled"),
            Interrupted::DeadlineElapsed => write!(f, "deadline elapsed"),
        }
    }
}

/// Extension trait racing futures against cancellation and deadlines.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the cancellation token.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Interrupted>;

    /// Race this future against an absolute deadline.
    async fn or_deadline(self, deadline: Instant) -> Result<Self::Output, Interrupted>;

    /// Race this future against both a token and a deadline.
    ///
    /// When both fire before the future completes the token wins: operator
    /// cancellation must be distinguishable from a timeout so the
    /// controller can report the right terminal cause.
    async fn or_cancel_at(
        self,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<Self::Output, Interrupted>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            res = self => Ok(res),
        }
    }

    async fn or_deadline(self, deadline: Instant) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => Err(Interrupted::DeadlineElapsed),
            res = self => Ok(res),
        }
    }

    async fn or_cancel_at(
        self,
        token: &CancellationToken,
        deadline: Instant,
    ) -> Result<Self::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupted::Cancelled),
            _ = tokio::time::sleep_until(deadline) => Err(Interrupted::DeadlineElapsed),
            res = self => Ok(res),
        }
    }
}
