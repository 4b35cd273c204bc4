//! Poll intervals, deadlines and target namespace for convergence checks
//!
//! Defaults suit a kind cluster on a developer machine. Slower environments
//! scale every deadline with `CRDB_TEST_TIMEOUT_MULTIPLIER` instead of
//! overriding each one.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crdb_common::{Error, DEFAULT_NAMESPACE};

use crate::poller::PollSpec;

/// Namespace the cluster under test lives in
pub const NAMESPACE_ENV: &str = "CRDB_TEST_NAMESPACE";
/// Kubeconfig path; unset means in-cluster or `~/.kube/config`
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
/// Seconds between ticks for every check
pub const POLL_INTERVAL_ENV: &str = "CRDB_TEST_POLL_INTERVAL_SECS";
/// Factor applied to every check timeout
pub const TIMEOUT_MULTIPLIER_ENV: &str = "CRDB_TEST_TIMEOUT_MULTIPLIER";

/// Read access to configuration variables
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of `key`, `None` when unset or empty
    fn var(&self, key: &str) -> Option<String>;
}

/// [`EnvSource`] backed by the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Settings shared by all checks of one verifier
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvergenceConfig {
    /// Namespace holding the cluster under test
    pub namespace: String,
    /// Explicit kubeconfig; `None` infers one
    pub kubeconfig: Option<PathBuf>,
    /// Seconds between ticks
    pub poll_interval_secs: u64,
    /// Deadline for the StatefulSet to become ready
    pub ready_timeout_secs: u64,
    /// Deadline for every member to run the expected image
    pub image_timeout_secs: u64,
    /// Deadline for volume claims to report the new size
    pub resize_timeout_secs: u64,
    /// Deadline for the bound claim count to match
    pub bound_claims_timeout_secs: u64,
    /// Deadline for a decommissioned node to drain
    pub decommission_timeout_secs: u64,
    /// Factor applied to every deadline
    pub timeout_multiplier: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: None,
            poll_interval_secs: 10,
            ready_timeout_secs: 60,
            image_timeout_secs: 400,
            resize_timeout_secs: 500,
            bound_claims_timeout_secs: 500,
            decommission_timeout_secs: 700,
            timeout_multiplier: 1.0,
        }
    }
}

impl ConvergenceConfig {
    /// Defaults overridden from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_source(&OsEnv)
    }

    /// Defaults overridden from `env`
    pub fn from_source(env: &dyn EnvSource) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(ns) = env.var(NAMESPACE_ENV) {
            config.namespace = ns;
        }
        if let Some(path) = env.var(KUBECONFIG_ENV) {
            config.kubeconfig = Some(PathBuf::from(path));
        }
        if let Some(raw) = env.var(POLL_INTERVAL_ENV) {
            config.poll_interval_secs = raw.trim().parse().map_err(|_| {
                Error::config(format!("{POLL_INTERVAL_ENV}={raw:?} is not a whole number of seconds"))
            })?;
        }
        if let Some(raw) = env.var(TIMEOUT_MULTIPLIER_ENV) {
            config.timeout_multiplier = raw.trim().parse().map_err(|_| {
                Error::config(format!("{TIMEOUT_MULTIPLIER_ENV}={raw:?} is not a number"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no poll can run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.namespace.is_empty() {
            return Err(Error::config("namespace must not be empty"));
        }
        if !self.timeout_multiplier.is_finite() || self.timeout_multiplier <= 0.0 {
            return Err(Error::config(format!(
                "timeout multiplier must be positive, got {}",
                self.timeout_multiplier
            )));
        }
        // Every check must admit at least one interval
        for spec in [
            self.ready_poll(),
            self.image_poll(),
            self.resize_poll(),
            self.bound_claims_poll(),
            self.decommission_poll(),
        ] {
            spec?;
        }
        Ok(())
    }

    /// Time between ticks
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Scale a base deadline by the multiplier
    pub fn scaled(&self, timeout: Duration) -> Result<Duration, Error> {
        Duration::try_from_secs_f64(timeout.as_secs_f64() * self.timeout_multiplier).map_err(|e| {
            Error::config(format!(
                "{timeout:?} scaled by {} is not a valid deadline: {e}",
                self.timeout_multiplier
            ))
        })
    }

    fn poll(&self, timeout_secs: u64) -> Result<PollSpec, Error> {
        PollSpec::new(self.interval(), self.scaled(Duration::from_secs(timeout_secs))?)
    }

    /// Poll spec for StatefulSet readiness
    pub fn ready_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.ready_timeout_secs)
    }

    /// Poll spec for the container image check
    pub fn image_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.image_timeout_secs)
    }

    /// Poll spec for volume claim resize
    pub fn resize_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.resize_timeout_secs)
    }

    /// Poll spec for the bound claim count
    pub fn bound_claims_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.bound_claims_timeout_secs)
    }

    /// Poll spec for node drain after decommission
    pub fn decommission_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.decommission_timeout_secs)
    }

    /// Poll spec for condition checks, which share the readiness deadline
    pub fn conditions_poll(&self) -> Result<PollSpec, Error> {
        self.poll(self.ready_timeout_secs)
    }
}
