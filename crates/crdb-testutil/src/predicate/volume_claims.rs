//! Persistent volume claim checks: resize and bound count

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;

use super::Predicate;
use crate::outcome::Outcome;
use crate::provider::SnapshotProvider;
use crate::quantity::quantities_equal;

const PHASE_BOUND: &str = "Bound";

/// Expected storage for the claims created from one volume template
///
/// Claims are named `<prefix><ordinal>`. Claims with an ordinal at or above
/// `expected_replica_count` were left behind by a scale-down and are not
/// expected to match.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeClaimRequirement {
    /// Claim name up to and including the trailing dash
    pub name_prefix: String,
    /// Current number of members
    pub expected_replica_count: i32,
    /// Storage every in-scope claim must request
    pub expected_storage: Quantity,
}

impl VolumeClaimRequirement {
    /// One requirement per volume template of a StatefulSet
    ///
    /// The StatefulSet controller names claims `<template>-<sts>-<ordinal>`.
    pub fn from_stateful_set(sts: &StatefulSet, storage: &Quantity) -> Vec<Self> {
        let Some(spec) = sts.spec.as_ref() else {
            return Vec::new();
        };
        let replicas = spec.replicas.unwrap_or(1);
        let sts_name = sts.name_any();

        spec.volume_claim_templates
            .iter()
            .flatten()
            .map(|template| Self {
                name_prefix: format!("{}-{sts_name}-", template.name_any()),
                expected_replica_count: replicas,
                expected_storage: storage.clone(),
            })
            .collect()
    }

    /// Names of the claims that must match, lowest ordinal first
    pub fn claim_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.expected_replica_count.max(0)).map(|i| format!("{}{i}", self.name_prefix))
    }

    /// Ordinal encoded in a claim name, if it belongs to this template
    fn ordinal_of(&self, claim_name: &str) -> Option<i32> {
        claim_name.strip_prefix(&self.name_prefix)?.parse().ok()
    }

    /// Returns true if the claim must match the expected storage
    pub fn is_in_scope(&self, claim_name: &str) -> bool {
        self.ordinal_of(claim_name)
            .is_some_and(|ordinal| (0..self.expected_replica_count).contains(&ordinal))
    }
}

fn requested_storage(claim: &PersistentVolumeClaim) -> Option<&Quantity> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
}

/// Decide whether every in-scope claim requests the expected storage
///
/// Claims outside every requirement's scope are ignored. An in-scope claim
/// that is missing from `claims` means the StatefulSet has not created it
/// yet.
pub fn resized_claims_outcome(
    requirements: &[VolumeClaimRequirement],
    claims: &[PersistentVolumeClaim],
) -> Outcome {
    for requirement in requirements {
        let in_scope: Vec<&PersistentVolumeClaim> = claims
            .iter()
            .filter(|c| requirement.is_in_scope(&c.name_any()))
            .collect();
        for name in requirement.claim_names() {
            let Some(claim) = in_scope.iter().find(|c| c.name_any() == name) else {
                return Outcome::pending(format!("claim {name} not found"));
            };
            match requested_storage(claim) {
                Some(q) if quantities_equal(q, &requirement.expected_storage) => {}
                Some(q) => {
                    return Outcome::pending(format!(
                        "claim {name} requests {}, want {}",
                        q.0, requirement.expected_storage.0
                    ))
                }
                None => return Outcome::pending(format!("claim {name} has no storage request")),
            }
        }
    }
    Outcome::Converged
}

/// Every in-scope claim has been resized to the expected storage
pub struct VolumeClaimsResized {
    provider: Arc<dyn SnapshotProvider>,
    requirements: Vec<VolumeClaimRequirement>,
}

impl VolumeClaimsResized {
    /// Check the given requirements
    pub fn new(provider: Arc<dyn SnapshotProvider>, requirements: Vec<VolumeClaimRequirement>) -> Self {
        Self {
            provider,
            requirements,
        }
    }
}

#[async_trait]
impl Predicate for VolumeClaimsResized {
    fn name(&self) -> &str {
        "volume-claims-resized"
    }

    /// Fetches only in-scope claims, one at a time, stopping at the first
    /// claim that is missing or fails
    async fn evaluate(&self) -> Outcome {
        let mut claims = Vec::new();
        for requirement in &self.requirements {
            for name in requirement.claim_names() {
                match self.provider.volume_claim(&name).await {
                    Ok(Some(claim)) => claims.push(claim),
                    Ok(None) => return Outcome::pending(format!("claim {name} not found")),
                    Err(e) => return Outcome::Fatal(e),
                }
            }
        }
        resized_claims_outcome(&self.requirements, &claims)
    }
}

/// Decide whether exactly `expected` of the claims are bound
pub fn bound_claims_outcome(claims: &[PersistentVolumeClaim], expected: usize) -> Outcome {
    let bound = claims
        .iter()
        .filter(|c| {
            c.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == PHASE_BOUND)
        })
        .count();

    if bound == expected {
        Outcome::Converged
    } else {
        Outcome::pending(format!("{bound} claims bound, want {expected}"))
    }
}

/// The number of bound claims matching a selector equals an expected count
///
/// The count is recomputed from a fresh list on every evaluation.
pub struct VolumeClaimCountBound {
    provider: Arc<dyn SnapshotProvider>,
    selector: String,
    expected: usize,
}

impl VolumeClaimCountBound {
    /// Expect `expected` bound claims among those matching `selector`
    pub fn new(provider: Arc<dyn SnapshotProvider>, selector: impl Into<String>, expected: usize) -> Self {
        Self {
            provider,
            selector: selector.into(),
            expected,
        }
    }
}

#[async_trait]
impl Predicate for VolumeClaimCountBound {
    fn name(&self) -> &str {
        "volume-claim-count-bound"
    }

    async fn evaluate(&self) -> Outcome {
        match self.provider.volume_claims(&self.selector).await {
            Ok(claims) => bound_claims_outcome(&claims, self.expected),
            Err(e) => Outcome::Fatal(e),
        }
    }
}
