//! Result of evaluating a convergence predicate once

use crdb_common::Error;

/// What one poll tick decided about the cluster
///
/// `Pending` drives another tick, `Fatal` aborts the poll immediately
/// regardless of remaining time.
#[derive(Debug)]
pub enum Outcome {
    /// Observed state matches the target
    Converged,
    /// Not there yet; the reason is logged and reported on timeout
    Pending(String),
    /// The check can never succeed by waiting longer
    Fatal(Error),
}

impl Outcome {
    /// Create a pending outcome with a reason
    pub fn pending(reason: impl Into<String>) -> Self {
        Self::Pending(reason.into())
    }

    /// Returns true if the target state was reached
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true if another tick is needed
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Returns true if the poll must abort
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<Result<Outcome, Error>> for Outcome {
    fn from(result: Result<Outcome, Error>) -> Self {
        result.unwrap_or_else(Outcome::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_become_fatal() {
        let outcome: Outcome = Err(Error::fetch("pods", "forbidden")).into();
        assert!(outcome.is_fatal());

        let outcome: Outcome = Ok(Outcome::pending("waiting")).into();
        assert!(outcome.is_pending());
        assert!(!outcome.is_converged());
    }
}
