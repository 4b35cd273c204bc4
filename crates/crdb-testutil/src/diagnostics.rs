//! Pod summaries for diagnosing a cluster that is slow to become ready

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::provider::SnapshotProvider;

/// Lines of log fetched from a pod that failed or restarted
pub const LOG_TAIL_LINES: i64 = 50;

/// Name, phase and condition flags of one pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSummary {
    /// Pod name
    pub name: String,
    /// Lifecycle phase, `Unknown` when unreported
    pub phase: String,
    /// Conditions as `Type=Status`
    pub conditions: Vec<String>,
    /// Sum of container restart counts
    pub restarts: i32,
}

impl PodSummary {
    /// Summarize a pod
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.name_any(),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            conditions: status
                .and_then(|s| s.conditions.as_ref())
                .map(|conds| {
                    conds
                        .iter()
                        .map(|c| format!("{}={}", c.type_, c.status))
                        .collect()
                })
                .unwrap_or_default(),
            restarts: status
                .and_then(|s| s.container_statuses.as_ref())
                .map(|cs| cs.iter().map(|c| c.restart_count).sum())
                .unwrap_or_default(),
        }
    }

    /// Returns true if the pod's log is worth fetching
    pub fn is_troubled(&self) -> bool {
        self.phase == "Failed" || self.restarts > 0
    }
}

/// Log every pod matching `selector`
///
/// Pods that failed or restarted also get the tail of their database
/// container log. Fetch failures are logged and otherwise ignored; this never
/// changes the outcome of the check that called it.
pub async fn log_pods(provider: &dyn SnapshotProvider, selector: &str) {
    match provider.pods(selector).await {
        Ok(pods) if pods.is_empty() => info!(selector, "No pods yet"),
        Ok(pods) => {
            for pod in &pods {
                let summary = PodSummary::from_pod(pod);
                info!(
                    pod = %summary.name,
                    phase = %summary.phase,
                    conditions = %summary.conditions.join(","),
                    restarts = summary.restarts,
                    "Pod status"
                );
                if summary.is_troubled() {
                    log_tail(provider, &summary.name).await;
                }
            }
        }
        Err(e) => warn!(selector, error = %e, "Failed to list pods"),
    }
}

async fn log_tail(provider: &dyn SnapshotProvider, pod: &str) {
    match provider.pod_log(pod, LOG_TAIL_LINES).await {
        Ok(log) => info!(pod, log = %log, "Pod log tail"),
        Err(e) => warn!(pod, error = %e, "Failed to fetch pod log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockSnapshotProvider;
    use crdb_common::Error;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodCondition, PodStatus};

    fn pending_pod() -> Pod {
        Pod {
            metadata: kube::api::ObjectMeta {
                name: Some("crdb-2".to_string()),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "PodScheduled".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn summary_lists_phase_and_conditions() {
        let summary = PodSummary::from_pod(&pending_pod());
        assert_eq!(summary.name, "crdb-2");
        assert_eq!(summary.phase, "Pending");
        assert_eq!(summary.conditions, vec!["PodScheduled=False"]);
        assert!(!summary.is_troubled());
    }

    #[test]
    fn pod_without_status_is_unknown() {
        let mut pod = pending_pod();
        pod.status = None;
        let summary = PodSummary::from_pod(&pod);
        assert_eq!(summary.phase, "Unknown");
        assert!(summary.conditions.is_empty());
    }

    #[tokio::test]
    async fn list_failure_is_swallowed() {
        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_pods()
            .times(1)
            .returning(|_| Err(Error::fetch("pods", "connection reset")));

        log_pods(&provider, "app=crdb").await;
    }

    #[tokio::test]
    async fn restarted_pod_gets_log_tail() {
        let mut crashing = pending_pod();
        crashing.metadata.name = Some("crdb-1".to_string());
        if let Some(status) = crashing.status.as_mut() {
            status.phase = Some("Running".to_string());
            status.container_statuses = Some(vec![ContainerStatus {
                name: "db".to_string(),
                restart_count: 3,
                ..Default::default()
            }]);
        }
        let healthy = pending_pod();

        let mut provider = MockSnapshotProvider::new();
        provider
            .expect_pods()
            .returning(move |_| Ok(vec![healthy.clone(), crashing.clone()]));
        provider
            .expect_pod_log()
            .withf(|name, tail| name == "crdb-1" && *tail == LOG_TAIL_LINES)
            .times(1)
            .returning(|_, _| Err(Error::fetch("pod/crdb-1/log", "container not found")));

        log_pods(&provider, "app=crdb").await;
    }
}
