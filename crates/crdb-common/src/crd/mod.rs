//! Custom Resource Definitions for CockroachDB clusters
//!
//! Only the fields the verification engine reads are modelled; unknown
//! fields in live objects are ignored on deserialization.

mod cluster;
mod types;

pub use cluster::{CrdbCluster, CrdbClusterSpec, CrdbClusterStatus, PodImage};
pub use types::{ClusterCondition, ClusterConditionType, ConditionStatus};
