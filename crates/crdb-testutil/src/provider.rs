//! Live state snapshots from the Kubernetes API
//!
//! Predicates never talk to the API server directly. They go through
//! [`SnapshotProvider`], which returns `None` for objects that do not exist
//! yet and an error for everything else that went wrong.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use tracing::trace;

use crdb_common::crd::CrdbCluster;
use crdb_common::naming::DB_CONTAINER_NAME;
use crdb_common::Error;

/// Read-only access to the objects a convergence check inspects
///
/// All lookups are scoped to the namespace the provider was built for.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Get the StatefulSet backing a cluster, `None` if not created yet
    async fn stateful_set(&self, name: &str) -> Result<Option<StatefulSet>, Error>;

    /// Get a CrdbCluster, `None` if not created yet
    async fn cluster(&self, name: &str) -> Result<Option<CrdbCluster>, Error>;

    /// Get a PersistentVolumeClaim by name, `None` if not created yet
    async fn volume_claim(&self, name: &str) -> Result<Option<PersistentVolumeClaim>, Error>;

    /// List pods matching a label selector
    async fn pods(&self, selector: &str) -> Result<Vec<Pod>, Error>;

    /// List PersistentVolumeClaims matching a label selector
    async fn volume_claims(&self, selector: &str) -> Result<Vec<PersistentVolumeClaim>, Error>;

    /// Last `tail_lines` lines of the database container's log in a pod
    async fn pod_log(&self, name: &str, tail_lines: i64) -> Result<String, Error>;
}

/// [`SnapshotProvider`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeSnapshotProvider {
    client: Client,
    namespace: String,
}

impl KubeSnapshotProvider {
    /// Create a provider for one namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Namespace this provider reads from
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Get an object, mapping 404 to `None`
async fn get_optional<K>(api: &Api<K>, kind: &str, name: &str) -> Result<Option<K>, Error>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(e)) if e.code == 404 => {
            trace!(kind, name, "Object not found yet");
            Ok(None)
        }
        Err(e) => Err(Error::fetch(format!("{kind}/{name}"), e)),
    }
}

async fn list_selected<K>(api: &Api<K>, kind: &str, selector: &str) -> Result<Vec<K>, Error>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    let params = ListParams::default().labels(selector);
    api.list(&params)
        .await
        .map(|list| list.items)
        .map_err(|e| Error::fetch(format!("{kind}s matching {selector:?}"), e))
}

#[async_trait]
impl SnapshotProvider for KubeSnapshotProvider {
    async fn stateful_set(&self, name: &str) -> Result<Option<StatefulSet>, Error> {
        get_optional(&self.api::<StatefulSet>(), "statefulset", name).await
    }

    async fn cluster(&self, name: &str) -> Result<Option<CrdbCluster>, Error> {
        get_optional(&self.api::<CrdbCluster>(), "crdbcluster", name).await
    }

    async fn volume_claim(&self, name: &str) -> Result<Option<PersistentVolumeClaim>, Error> {
        get_optional(
            &self.api::<PersistentVolumeClaim>(),
            "persistentvolumeclaim",
            name,
        )
        .await
    }

    async fn pods(&self, selector: &str) -> Result<Vec<Pod>, Error> {
        list_selected(&self.api::<Pod>(), "pod", selector).await
    }

    async fn volume_claims(&self, selector: &str) -> Result<Vec<PersistentVolumeClaim>, Error> {
        list_selected(
            &self.api::<PersistentVolumeClaim>(),
            "persistentvolumeclaim",
            selector,
        )
        .await
    }

    async fn pod_log(&self, name: &str, tail_lines: i64) -> Result<String, Error> {
        let params = LogParams {
            container: Some(DB_CONTAINER_NAME.to_string()),
            tail_lines: Some(tail_lines),
            ..Default::default()
        };
        self.api::<Pod>()
            .logs(name, &params)
            .await
            .map_err(|e| Error::fetch(format!("pod/{name}/log"), e))
    }
}
