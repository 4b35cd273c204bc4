//! Convergence predicates
//!
//! Each predicate decides, from one freshly fetched snapshot, whether the
//! cluster has reached a target state. The decision logic lives in a pure
//! `*_outcome` function per variant so it can be exercised without an API
//! server; the [`Predicate`] implementation only fetches and delegates.
//!
//! Absent objects are `Pending`, fetch failures are `Fatal`.

mod conditions;
mod drain;
mod image;
mod replica_set;
mod volume_claims;

use async_trait::async_trait;

use crate::outcome::Outcome;

pub use conditions::{conditions_outcome, ConditionSetEquals};
pub use drain::{drain_outcome, node_status_command, DrainTarget, NodeDrained};
pub use image::{images_outcome, ContainerImageMatches};
pub use replica_set::{replica_set_outcome, ReplicaSetReady, ReplicaSetSnapshot};
pub use volume_claims::{
    bound_claims_outcome, resized_claims_outcome, VolumeClaimCountBound, VolumeClaimRequirement,
    VolumeClaimsResized,
};

/// A target state that can be checked against live cluster state
#[async_trait]
pub trait Predicate: Send + Sync {
    /// Short name used in logs and poll errors
    fn name(&self) -> &str;

    /// Fetch a fresh snapshot and decide whether the target is reached
    async fn evaluate(&self) -> Outcome;
}
