//! Test helpers for integration tests
//!
//! Manages the kind cluster, the CrdbCluster CRD and test namespaces.

use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::{Client, Config, CustomResourceExt};
use tokio::sync::OnceCell;
use tokio::time::sleep;

use crdb_common::crd::{CrdbCluster, CrdbClusterSpec};
use crdb_testutil::{ClusterVerifier, ConvergenceConfig, EnvImageCatalog, KubeExecutor, KubeSnapshotProvider};

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "crdb-integration-test";

/// Image used when a test does not pin a version
pub const TEST_IMAGE: &str = "cockroachdb/cockroach:v21.1.7";

static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

static CRD_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

fn kind_cluster_exists(name: &str) -> Result<bool, String> {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    let clusters = String::from_utf8_lossy(&output.stdout);
    Ok(clusters.lines().any(|line| line.trim() == name))
}

/// Create a kind cluster for testing unless it already exists
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name)? {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

/// Install the CrdbCluster CRD if the operator has not already
async fn install_crd(client: &Client) -> Result<(), kube::Error> {
    let crd = CrdbCluster::crd();
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());

    match crds.create(&PostParams::default(), &crd).await {
        Ok(_) => {
            println!("CrdbCluster CRD installed");
            sleep(Duration::from_secs(2)).await;
            Ok(())
        }
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(e),
    }
}

/// Create a Kubernetes client for the kind cluster's context
pub async fn create_test_client() -> Result<Client, String> {
    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(format!("kind-{TEST_CLUSTER_NAME}")),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster exists and has the CRD, returning a fresh client
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    crdb_common::telemetry::init_test_tracing();

    CLUSTER_INIT
        .get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME))
        .clone()?;

    let client = create_test_client().await?;

    CRD_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crd(&client)
                .await
                .map_err(|e| format!("failed to install CRD: {e}"))
        })
        .await
        .clone()?;

    Ok(client)
}

/// Create a namespace, replacing any left over from an earlier run
pub async fn fresh_namespace(client: &Client, name: &str) -> Result<(), String> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    delete_namespace(client, name).await;

    // A terminating namespace rejects creates until it is gone
    for _ in 0..60 {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match namespaces.create(&PostParams::default(), &ns).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => sleep(Duration::from_secs(2)).await,
            Err(e) => return Err(format!("failed to create namespace {name}: {e}")),
        }
    }
    Err(format!("namespace {name} did not finish terminating"))
}

/// Delete a namespace, ignoring errors
pub async fn delete_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let _ = namespaces.delete(name, &DeleteParams::default()).await;
}

/// A cluster spec with `nodes` members running [`TEST_IMAGE`]
pub fn sample_cluster(name: &str, nodes: i32) -> CrdbCluster {
    let spec: CrdbClusterSpec = serde_json::from_value(serde_json::json!({
        "nodes": nodes,
        "image": { "name": TEST_IMAGE },
        "tlsEnabled": false,
    }))
    .expect("sample spec should deserialize");
    CrdbCluster::new(name, spec)
}

/// Create `cluster` in `namespace`
pub async fn create_cluster(client: &Client, namespace: &str, cluster: &CrdbCluster) -> CrdbCluster {
    let api: Api<CrdbCluster> = Api::namespaced(client.clone(), namespace);
    api.create(&PostParams::default(), cluster)
        .await
        .expect("failed to create CrdbCluster")
}

/// Verifier for `namespace`, with environment overrides for deadlines
pub fn verifier(client: Client, namespace: &str) -> ClusterVerifier {
    let mut config = ConvergenceConfig::from_env().expect("valid test configuration");
    config.namespace = namespace.to_string();

    ClusterVerifier::new(
        std::sync::Arc::new(KubeSnapshotProvider::new(client.clone(), namespace)),
        std::sync::Arc::new(KubeExecutor::new(client, namespace)),
        std::sync::Arc::new(EnvImageCatalog),
        config,
    )
}
