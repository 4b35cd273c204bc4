//! Common types for CockroachDB cluster verification: CRDs, naming
//! conventions, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod naming;
pub mod telemetry;

pub use error::Error;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";
