//! StatefulSet readiness

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;

use super::Predicate;
use crate::outcome::Outcome;
use crate::provider::SnapshotProvider;

/// Desired and ready member counts of a StatefulSet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicaSetSnapshot {
    /// Members the controller should be running
    pub desired: i32,
    /// Members passing their readiness probe
    pub ready: i32,
    /// Members the controller currently tracks
    pub current: i32,
}

impl ReplicaSetSnapshot {
    /// Extract counts from a StatefulSet
    ///
    /// `desired` comes from the spec when set, so a freshly created set with
    /// an empty status is not mistaken for a ready one.
    pub fn from_stateful_set(sts: &StatefulSet) -> Self {
        let status = sts.status.as_ref();
        let current = status.map(|s| s.replicas).unwrap_or(0);
        Self {
            desired: sts
                .spec
                .as_ref()
                .and_then(|s| s.replicas)
                .unwrap_or(current),
            ready: status.and_then(|s| s.ready_replicas).unwrap_or(0),
            current,
        }
    }

    /// Returns true when every desired member is ready
    pub fn is_ready(&self) -> bool {
        self.ready == self.desired
    }
}

/// Decide readiness from an optional snapshot
pub fn replica_set_outcome(snapshot: Option<&ReplicaSetSnapshot>) -> Outcome {
    match snapshot {
        None => Outcome::pending("statefulset not found"),
        Some(s) if s.is_ready() => Outcome::Converged,
        Some(s) => Outcome::pending(format!(
            "statefulset not ready: {}/{} members ready",
            s.ready, s.desired
        )),
    }
}

/// Every desired member of the cluster's StatefulSet is ready
pub struct ReplicaSetReady {
    provider: Arc<dyn SnapshotProvider>,
    name: String,
}

impl ReplicaSetReady {
    /// Check the StatefulSet with the given name
    pub fn new(provider: Arc<dyn SnapshotProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl Predicate for ReplicaSetReady {
    fn name(&self) -> &str {
        "replica-set-ready"
    }

    async fn evaluate(&self) -> Outcome {
        match self.provider.stateful_set(&self.name).await {
            Ok(sts) => {
                let snapshot = sts.as_ref().map(ReplicaSetSnapshot::from_stateful_set);
                replica_set_outcome(snapshot.as_ref())
            }
            Err(e) => Outcome::Fatal(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::poller::{ConvergencePoller, PollSpec};
    use crate::provider::MockSnapshotProvider;
    use crdb_common::Error;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    pub(crate) fn stateful_set(desired: i32, ready: i32) -> StatefulSet {
        StatefulSet {
            metadata: kube::api::ObjectMeta {
                name: Some("crdb".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(desired),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                replicas: desired,
                ready_replicas: Some(ready),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn missing_status_is_not_ready() {
        let mut sts = stateful_set(3, 0);
        sts.status = None;
        let snapshot = ReplicaSetSnapshot::from_stateful_set(&sts);
        assert_eq!(snapshot.desired, 3);
        assert!(replica_set_outcome(Some(&snapshot)).is_pending());
    }

    #[test]
    fn absent_statefulset_is_pending() {
        assert!(replica_set_outcome(None).is_pending());
    }

    #[tokio::test]
    async fn ready_on_first_tick_converges() {
        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_stateful_set()
            .times(1)
            .returning(|_| Ok(Some(stateful_set(3, 3))));

        let predicate = ReplicaSetReady::new(Arc::new(provider), "crdb");
        assert!(predicate.evaluate().await.is_converged());
    }

    #[tokio::test(start_paused = true)]
    async fn converges_once_last_member_becomes_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut provider = MockSnapshotProvider::new();
        provider.expect_stateful_set().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let ready = if n <= 3 { 2 } else { 3 };
            Ok(Some(stateful_set(3, ready)))
        });

        let predicate = ReplicaSetReady::new(Arc::new(provider), "crdb");
        let spec = PollSpec::new(Duration::from_secs(10), Duration::from_secs(60))
            .expect("valid spec");
        let start = Instant::now();

        ConvergencePoller::new(spec)
            .run_predicate(&predicate)
            .await
            .expect("should converge");

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_stateful_set()
            .returning(|_| Err(Error::fetch("statefulset/crdb", "forbidden")));

        let predicate = ReplicaSetReady::new(Arc::new(provider), "crdb");
        assert!(predicate.evaluate().await.is_fatal());
    }
}
