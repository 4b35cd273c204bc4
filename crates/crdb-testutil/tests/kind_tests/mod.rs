//! Integration tests for the cluster verifier
//!
//! Each test creates a `CrdbCluster`, lets the operator reconcile it and uses
//! [`ClusterVerifier`](crdb_testutil::ClusterVerifier) to wait for the
//! expected state:
//!
//! - `convergence`: readiness, image rollout, bound claims, resize and
//!   decommission of a member

mod convergence;
mod helpers;
