//! Exact comparison of a cluster's condition list

use std::sync::Arc;

use async_trait::async_trait;

use crdb_common::crd::{ClusterCondition, ClusterConditionType, ConditionStatus};

use super::Predicate;
use crate::outcome::Outcome;
use crate::provider::SnapshotProvider;

/// Compare expected and observed conditions, ignoring transition times
///
/// The comparison is order-sensitive and requires the same length: an extra
/// condition on the cluster is a mismatch.
pub fn conditions_outcome(expected: &[ClusterCondition], actual: &[ClusterCondition]) -> Outcome {
    let strip = |conds: &[ClusterCondition]| -> Vec<ClusterCondition> {
        conds
            .iter()
            .map(ClusterCondition::without_transition_time)
            .collect()
    };

    if strip(expected) == strip(actual) {
        Outcome::Converged
    } else {
        Outcome::pending(format!(
            "conditions are [{}], want [{}]",
            describe(actual),
            describe(expected)
        ))
    }
}

fn describe(conds: &[ClusterCondition]) -> String {
    conds
        .iter()
        .map(|c| format!("{}={}", c.type_, c.status))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The cluster's `status.conditions` equals an expected list
pub struct ConditionSetEquals {
    provider: Arc<dyn SnapshotProvider>,
    cluster: String,
    expected: Vec<ClusterCondition>,
}

impl ConditionSetEquals {
    /// Expect exactly `expected` on the named cluster
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        cluster: impl Into<String>,
        expected: Vec<ClusterCondition>,
    ) -> Self {
        Self {
            provider,
            cluster: cluster.into(),
            expected,
        }
    }

    /// Expect the single condition `Decommission=True`
    pub fn decommissioned(provider: Arc<dyn SnapshotProvider>, cluster: impl Into<String>) -> Self {
        Self::new(
            provider,
            cluster,
            vec![ClusterCondition::new(
                ClusterConditionType::Decommission,
                ConditionStatus::True,
            )],
        )
    }
}

#[async_trait]
impl Predicate for ConditionSetEquals {
    fn name(&self) -> &str {
        "condition-set-equals"
    }

    async fn evaluate(&self) -> Outcome {
        match self.provider.cluster(&self.cluster).await {
            Ok(Some(cluster)) => {
                let actual = cluster
                    .status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or_default();
                conditions_outcome(&self.expected, actual)
            }
            Ok(None) => Outcome::pending(format!("cluster {} not found", self.cluster)),
            Err(e) => Outcome::Fatal(e),
        }
    }
}
