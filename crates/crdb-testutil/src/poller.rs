//! Bounded-time polling until a predicate converges
//!
//! The poller drives one tick at a time: evaluate, then sleep for the
//! interval. The first tick fires immediately and the deadline is measured
//! from it. A `Fatal` outcome stops the loop at once; only `Pending` is
//! retried.
//!
//! Cancellation is raced against both the in-flight tick and the sleep, so a
//! caller-initiated abort drops any outstanding network call instead of
//! waiting for it to finish.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crdb_common::Error;

use crate::outcome::Outcome;
use crate::predicate::Predicate;

/// Interval and deadline for one convergence check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSpec {
    interval: Duration,
    timeout: Duration,
}

impl PollSpec {
    /// Create a poll spec, rejecting a zero interval or a timeout shorter
    /// than one interval
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, Error> {
        if interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        if timeout < interval {
            return Err(Error::config(format!(
                "poll timeout {timeout:?} is shorter than interval {interval:?}"
            )));
        }
        Ok(Self { interval, timeout })
    }

    /// Time slept between ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum time from the first tick until the poll gives up
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same interval with a different timeout
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, Error> {
        Self::new(self.interval, timeout)
    }
}

/// Terminal failure of a poll
#[derive(Debug, Error)]
pub enum PollError {
    /// The deadline passed without the predicate converging
    #[error("timed out after {elapsed:?} ({ticks} checks) waiting for {operation}: {last_reason}")]
    Timeout {
        /// Name of the check
        operation: String,
        /// Time since the first tick
        elapsed: Duration,
        /// Number of ticks evaluated
        ticks: u32,
        /// Reason given by the last pending tick
        last_reason: String,
    },

    /// A tick reported a fatal error
    #[error("{operation} aborted: {source}")]
    Aborted {
        /// Name of the check
        operation: String,
        /// The fatal error
        #[source]
        source: Error,
    },

    /// The caller cancelled the poll
    #[error("{operation} cancelled")]
    Cancelled {
        /// Name of the check
        operation: String,
    },
}

impl PollError {
    /// The fatal error behind an aborted poll
    pub fn fatal_error(&self) -> Option<&Error> {
        match self {
            PollError::Aborted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true if the poll ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

/// Sequential, single-task poll loop
#[derive(Clone, Debug)]
pub struct ConvergencePoller {
    spec: PollSpec,
    cancel: CancellationToken,
}

impl ConvergencePoller {
    /// Create a poller that can only be stopped by its deadline
    pub fn new(spec: PollSpec) -> Self {
        Self {
            spec,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop polling when the given token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The poll spec in effect
    pub fn spec(&self) -> PollSpec {
        self.spec
    }

    /// Evaluate `tick` until it converges, fails fatally, or the deadline passes
    pub async fn run<F, Fut>(&self, operation: &str, mut tick: F) -> Result<(), PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let start = Instant::now();
        let mut ticks = 0u32;

        loop {
            ticks += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(operation, ticks)),
                outcome = tick() => outcome,
            };

            match outcome {
                Outcome::Converged => {
                    debug!(
                        operation,
                        tick = ticks,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Converged"
                    );
                    return Ok(());
                }
                Outcome::Fatal(e) => {
                    warn!(
                        operation,
                        tick = ticks,
                        context = e.context().unwrap_or_default(),
                        error = %e,
                        "Check failed, not retrying"
                    );
                    return Err(PollError::Aborted {
                        operation: operation.to_string(),
                        source: e,
                    });
                }
                Outcome::Pending(reason) => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.spec.timeout {
                        warn!(operation, ticks, reason = %reason, "Timed out waiting for convergence");
                        return Err(PollError::Timeout {
                            operation: operation.to_string(),
                            elapsed,
                            ticks,
                            last_reason: reason,
                        });
                    }
                    trace!(operation, tick = ticks, reason = %reason, "Not yet converged");
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled(operation, ticks)),
                _ = tokio::time::sleep(self.spec.interval) => {}
            }
        }
    }

    /// Drive a predicate to convergence
    pub async fn run_predicate(&self, predicate: &dyn Predicate) -> Result<(), PollError> {
        self.run(predicate.name(), move || predicate.evaluate())
            .await
    }

    fn cancelled(&self, operation: &str, ticks: u32) -> PollError {
        debug!(operation, ticks, "Poll cancelled");
        PollError::Cancelled {
            operation: operation.to_string(),
        }
    }
}
