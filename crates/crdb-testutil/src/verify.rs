//! One `Result`-returning method per cluster assertion
//!
//! [`ClusterVerifier`] wires predicates to the snapshot provider, command
//! executor and image catalog, and picks the poll spec for each check from
//! [`ConvergenceConfig`]. Composite checks that first need the StatefulSet
//! to settle are built as tick closures over the simple predicates.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crdb_common::crd::{ClusterCondition, CrdbCluster};
use crdb_common::kube_utils::create_client;
use crdb_common::naming::selector_string;
use crdb_common::Error;

use crate::config::ConvergenceConfig;
use crate::database::{verify_database_functions, verify_downgrade_option, ConnectionSpec, SqlConnector};
use crate::diagnostics::log_pods;
use crate::exec::{KubeExecutor, RemoteCommandExecutor};
use crate::images::{EnvImageCatalog, ImageCatalog};
use crate::outcome::Outcome;
use crate::poller::{ConvergencePoller, PollError, PollSpec};
use crate::predicate::{
    replica_set_outcome, ConditionSetEquals, ContainerImageMatches, NodeDrained, Predicate,
    ReplicaSetReady, ReplicaSetSnapshot, VolumeClaimCountBound, VolumeClaimRequirement,
    VolumeClaimsResized,
};
use crate::provider::{KubeSnapshotProvider, SnapshotProvider};

/// Checks the state of CockroachDB clusters in one namespace
pub struct ClusterVerifier {
    provider: Arc<dyn SnapshotProvider>,
    executor: Arc<dyn RemoteCommandExecutor>,
    images: Arc<dyn ImageCatalog>,
    config: ConvergenceConfig,
    cancel: CancellationToken,
}

impl ClusterVerifier {
    /// Create a verifier from explicit collaborators
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        executor: Arc<dyn RemoteCommandExecutor>,
        images: Arc<dyn ImageCatalog>,
        config: ConvergenceConfig,
    ) -> Self {
        Self {
            provider,
            executor,
            images,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a verifier talking to the cluster named by `config`
    pub async fn connect(config: ConvergenceConfig) -> Result<Self, Error> {
        config.validate()?;
        let client = create_client(config.kubeconfig.as_deref()).await?;
        let provider = KubeSnapshotProvider::new(client.clone(), config.namespace.clone());
        let executor = KubeExecutor::new(client, config.namespace.clone());
        Ok(Self::new(
            Arc::new(provider),
            Arc::new(executor),
            Arc::new(EnvImageCatalog),
            config,
        ))
    }

    /// Abort any running check when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Namespace the checks run against
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Settings in effect
    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    fn poller(&self, operation: &str, spec: Result<PollSpec, Error>) -> Result<ConvergencePoller, PollError> {
        let spec = spec.map_err(|e| aborted(operation, e))?;
        Ok(ConvergencePoller::new(spec).with_cancellation(self.cancel.clone()))
    }

    /// Wait for every member of the cluster's StatefulSet to be ready
    ///
    /// `timeout` overrides the configured readiness deadline. Member pods are
    /// logged on every tick that is not ready yet.
    pub async fn require_cluster_ready(
        &self,
        cluster: &CrdbCluster,
        timeout: Option<Duration>,
    ) -> Result<(), PollError> {
        const OP: &str = "cluster-ready";
        let spec = match timeout {
            Some(t) => self.config.ready_poll().and_then(|s| s.with_timeout(t)),
            None => self.config.ready_poll(),
        };
        let poller = self.poller(OP, spec)?;

        let ready = ReplicaSetReady::new(self.provider.clone(), cluster.stateful_set_name());
        let selector = cluster.member_selector();
        let (ready, selector, provider) = (&ready, selector.as_str(), self.provider.as_ref());

        poller
            .run(OP, move || async move {
                let outcome = ready.evaluate().await;
                if outcome.is_pending() {
                    log_pods(provider, selector).await;
                }
                outcome
            })
            .await
    }

    /// Wait for every member's database container to run the expected image
    ///
    /// The expected image is resolved once before polling; a version with no
    /// registered image fails immediately.
    pub async fn require_db_containers_to_use_image(&self, cluster: &CrdbCluster) -> Result<(), PollError> {
        const OP: &str = "db-containers-use-image";
        let poller = self.poller(OP, self.config.image_poll())?;
        let predicate =
            ContainerImageMatches::for_cluster(self.provider.clone(), cluster, self.images.as_ref())
                .map_err(|e| aborted(OP, e))?;

        info!(cluster = %cluster.name_any(), image = predicate.expected(), "Waiting for members to run image");
        poller.run_predicate(&predicate).await
    }

    /// Wait for a cluster's condition list to equal `expected`
    pub async fn require_cluster_conditions(
        &self,
        name: &str,
        expected: Vec<ClusterCondition>,
    ) -> Result<(), PollError> {
        let predicate = ConditionSetEquals::new(self.provider.clone(), name, expected);
        self.poller(predicate.name(), self.config.conditions_poll())?
            .run_predicate(&predicate)
            .await
    }

    /// Wait for a cluster to report exactly `Decommission=True`
    pub async fn require_cluster_decommissioned(&self, name: &str) -> Result<(), PollError> {
        let predicate = ConditionSetEquals::decommissioned(self.provider.clone(), name);
        self.poller(predicate.name(), self.config.conditions_poll())?
            .run_predicate(&predicate)
            .await
    }

    /// Wait for the claims of every current member to request `storage`
    ///
    /// Requirements are re-derived each tick from the StatefulSet's volume
    /// templates and replica count, once the StatefulSet is ready.
    pub async fn require_volume_claims_resized(
        &self,
        cluster: &CrdbCluster,
        storage: &Quantity,
    ) -> Result<(), PollError> {
        const OP: &str = "volume-claims-resized";
        let poller = self.poller(OP, self.config.resize_poll())?;
        let sts_name = cluster.stateful_set_name();
        let (provider, sts_name) = (&self.provider, sts_name.as_str());

        poller
            .run(OP, move || async move {
                let sts = match ready_stateful_set(provider.as_ref(), sts_name).await {
                    Ok(sts) => sts,
                    Err(outcome) => return outcome,
                };
                let requirements = VolumeClaimRequirement::from_stateful_set(&sts, storage);
                if requirements.is_empty() {
                    return Outcome::Fatal(Error::unexpected_state_in(
                        OP,
                        format!("statefulset {sts_name} has no volume claim templates"),
                    ));
                }
                VolumeClaimsResized::new(Arc::clone(provider), requirements)
                    .evaluate()
                    .await
            })
            .await
    }

    /// Wait for exactly `expected` claims selected by the StatefulSet to be bound
    pub async fn require_bound_volume_claims(
        &self,
        cluster: &CrdbCluster,
        expected: usize,
    ) -> Result<(), PollError> {
        const OP: &str = "volume-claim-count-bound";
        let poller = self.poller(OP, self.config.bound_claims_poll())?;
        let sts_name = cluster.stateful_set_name();
        let (provider, sts_name) = (&self.provider, sts_name.as_str());

        poller
            .run(OP, move || async move {
                let sts = match provider.stateful_set(sts_name).await {
                    Ok(Some(sts)) => sts,
                    Ok(None) => return Outcome::pending("statefulset not found"),
                    Err(e) => return Outcome::Fatal(e),
                };
                let Some(spec) = sts.spec.as_ref() else {
                    return Outcome::pending("statefulset has no spec yet");
                };
                match selector_string(&spec.selector) {
                    Ok(selector) => {
                        VolumeClaimCountBound::new(Arc::clone(provider), selector, expected)
                            .evaluate()
                            .await
                    }
                    Err(e) => Outcome::Fatal(e),
                }
            })
            .await
    }

    /// Wait for member `node_count` to drain after the cluster shrank to
    /// `node_count` members
    ///
    /// Each tick requires a ready StatefulSet reporting `node_count` replicas
    /// before the node status table is consulted.
    pub async fn require_decommission_node(
        &self,
        cluster: &CrdbCluster,
        node_count: i32,
    ) -> Result<(), PollError> {
        const OP: &str = "decommission-node";
        let poller = self.poller(OP, self.config.decommission_poll())?;
        let drained = NodeDrained::for_cluster(
            self.executor.clone(),
            cluster,
            self.namespace(),
            node_count,
        );
        info!(address = drained.target().as_str(), "Waiting for node to drain");

        let sts_name = cluster.stateful_set_name();
        let (provider, sts_name, drained) = (self.provider.as_ref(), sts_name.as_str(), &drained);

        poller
            .run(OP, move || async move {
                let sts = match ready_stateful_set(provider, sts_name).await {
                    Ok(sts) => sts,
                    Err(outcome) => return outcome,
                };
                let current = ReplicaSetSnapshot::from_stateful_set(&sts).current;
                if current != node_count {
                    return Outcome::pending(format!(
                        "statefulset has {current} replicas, want {node_count}"
                    ));
                }
                drained.evaluate().await
            })
            .await
    }

    /// Write and read back rows through member 0
    pub async fn require_database_functions(
        &self,
        cluster: &CrdbCluster,
        connector: &dyn SqlConnector,
    ) -> Result<(), Error> {
        let spec = ConnectionSpec::for_cluster(cluster, self.namespace())?;
        let mut conn = connector.connect(&spec).await?;
        let result = verify_database_functions(conn.as_mut()).await;
        conn.close();
        result
    }

    /// Check that downgrades are pinned to `version`
    pub async fn require_downgrade_option(
        &self,
        cluster: &CrdbCluster,
        version: &str,
        connector: &dyn SqlConnector,
    ) -> Result<(), Error> {
        let spec = ConnectionSpec::for_cluster(cluster, self.namespace())?;
        let mut conn = connector.connect(&spec).await?;
        let result = verify_downgrade_option(conn.as_mut(), version).await;
        conn.close();
        result
    }
}

fn aborted(operation: &str, source: Error) -> PollError {
    PollError::Aborted {
        operation: operation.to_string(),
        source,
    }
}

/// Fetch a StatefulSet that exists and has every member ready, or the
/// outcome to report for this tick
async fn ready_stateful_set(provider: &dyn SnapshotProvider, name: &str) -> Result<StatefulSet, Outcome> {
    match provider.stateful_set(name).await {
        Ok(Some(sts)) => {
            let snapshot = ReplicaSetSnapshot::from_stateful_set(&sts);
            if snapshot.is_ready() {
                Ok(sts)
            } else {
                Err(replica_set_outcome(Some(&snapshot)))
            }
        }
        Ok(None) => Err(replica_set_outcome(None)),
        Err(e) => Err(Outcome::Fatal(e)),
    }
}
