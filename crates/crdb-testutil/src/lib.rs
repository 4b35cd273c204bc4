//! Eventual-state convergence checks for CockroachDB clusters on Kubernetes
//!
//! A check is a [`Predicate`] driven by a [`ConvergencePoller`]: the poller
//! evaluates it once per interval until it converges, fails fatally, or its
//! deadline passes. Predicates read live state through a [`SnapshotProvider`]
//! and, for node drain, a [`RemoteCommandExecutor`].
//!
//! Most callers only need [`ClusterVerifier`], which offers one method per
//! assertion:
//!
//! ```no_run
//! # async fn run(cluster: crdb_common::crd::CrdbCluster) -> Result<(), Box<dyn std::error::Error>> {
//! use crdb_testutil::{ClusterVerifier, ConvergenceConfig};
//!
//! let verifier = ClusterVerifier::connect(ConvergenceConfig::from_env()?).await?;
//! verifier.require_cluster_ready(&cluster, None).await?;
//! verifier.require_db_containers_to_use_image(&cluster).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod database;
pub mod diagnostics;
pub mod exec;
pub mod images;
pub mod node_status;
pub mod outcome;
pub mod poller;
pub mod predicate;
pub mod provider;
pub mod quantity;
pub mod verify;

pub use config::ConvergenceConfig;
pub use exec::{ExecOutput, KubeExecutor, RemoteCommandExecutor};
pub use images::{EnvImageCatalog, ImageCatalog};
pub use node_status::{NodeStatusRecord, NodeStatusTable};
pub use outcome::Outcome;
pub use poller::{ConvergencePoller, PollError, PollSpec};
pub use predicate::Predicate;
pub use provider::{KubeSnapshotProvider, SnapshotProvider};
pub use verify::ClusterVerifier;
