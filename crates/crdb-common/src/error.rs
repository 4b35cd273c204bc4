//! Error types for CockroachDB cluster verification
//!
//! Errors carry the context needed to diagnose a failed convergence check:
//! which resource was being fetched, which pod a command ran in, or which
//! line of tool output could not be parsed.

use thiserror::Error;

/// Main error type for cluster verification
#[derive(Debug, Error)]
pub enum Error {
    /// A snapshot of live cluster state could not be retrieved
    #[error("failed to fetch {resource}: {message}")]
    Fetch {
        /// Resource being fetched (e.g., "statefulset/crdb")
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Tool output did not have the expected shape
    #[error("parse error{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse {
        /// Description of what could not be parsed
        message: String,
        /// 1-based line of the offending input, if known
        line: Option<u64>,
    },

    /// The cluster reported a state the check did not expect
    #[error("unexpected state [{context}]: {message}")]
    UnexpectedState {
        /// Check that observed the state (e.g., "node-drained")
        context: String,
        /// Description of the observed state
        message: String,
    },

    /// Remote command execution inside a pod failed
    #[error("exec in pod {pod} failed: {message}")]
    Exec {
        /// Pod the command was executed in
        pod: String,
        /// Error output or failure description
        message: String,
    },

    /// SQL collaborator error
    #[error("database error: {message}")]
    Database {
        /// Description of what failed
        message: String,
    },

    /// Invalid or missing configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what is misconfigured
        message: String,
    },
}

impl Error {
    /// Create a fetch error for the given resource
    pub fn fetch(resource: impl Into<String>, msg: impl std::fmt::Display) -> Self {
        Self::Fetch {
            resource: resource.into(),
            message: msg.to_string(),
        }
    }

    /// Create a parse error without position information
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
            line: None,
        }
    }

    /// Create a parse error pointing at a specific input line
    pub fn parse_at(line: u64, msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
            line: Some(line),
        }
    }

    /// Create an unexpected-state error with the name of the observing check
    pub fn unexpected_state_in(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UnexpectedState {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create an exec error for a pod
    pub fn exec(pod: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Exec {
            pod: pod.into(),
            message: msg.into(),
        }
    }

    /// Create a database error
    pub fn database(msg: impl std::fmt::Display) -> Self {
        Self::Database {
            message: msg.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Fetch { resource, .. } => Some(resource),
            Error::UnexpectedState { context, .. } => Some(context),
            Error::Exec { pod, .. } => Some(pod),
            _ => None,
        }
    }
}
