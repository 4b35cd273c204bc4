//! Stories about waiting for a CockroachDB cluster to reach a target state
//!
//! Every story starts from a fresh namespace so runs do not see claims or
//! pods left behind by earlier ones.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, Patch, PatchParams};
use serde_json::json;

use crdb_common::crd::CrdbCluster;

use super::helpers::{
    create_cluster, delete_namespace, ensure_test_cluster, fresh_namespace, sample_cluster,
    verifier,
};

/// Story: a new three-node cluster comes up
///
/// Expected behavior:
/// - Every StatefulSet member becomes ready
/// - Every database container runs the requested image
/// - One claim per member is bound
#[tokio::test]
#[ignore = "requires kind cluster with the operator - run with: cargo test --test kind -- --ignored"]
async fn story_new_cluster_becomes_ready() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let ns = "crdb-e2e-ready";
    fresh_namespace(&client, ns).await.expect("namespace");

    let cluster = create_cluster(&client, ns, &sample_cluster("crdb", 3)).await;
    let verifier = verifier(client.clone(), ns);

    verifier
        .require_cluster_ready(&cluster, Some(std::time::Duration::from_secs(600)))
        .await
        .expect("cluster should become ready");
    verifier
        .require_db_containers_to_use_image(&cluster)
        .await
        .expect("members should run the requested image");
    verifier
        .require_bound_volume_claims(&cluster, 3)
        .await
        .expect("three claims should be bound");

    delete_namespace(&client, ns).await;
}

/// Story: an operator grows the data volumes of a running cluster
///
/// Expected behavior:
/// - Every member's claim reports the new size once the StatefulSet settles
#[tokio::test]
#[ignore = "requires kind cluster with the operator and an expandable storage class"]
async fn story_volumes_are_resized() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let ns = "crdb-e2e-resize";
    fresh_namespace(&client, ns).await.expect("namespace");

    let cluster = create_cluster(&client, ns, &sample_cluster("crdb", 3)).await;
    let verifier = verifier(client.clone(), ns);
    verifier
        .require_cluster_ready(&cluster, Some(std::time::Duration::from_secs(600)))
        .await
        .expect("cluster should become ready");

    let api: Api<CrdbCluster> = Api::namespaced(client.clone(), ns);
    api.patch(
        "crdb",
        &PatchParams::default(),
        &Patch::Merge(json!({
            "spec": { "dataStore": { "pvc": { "spec": { "resources": { "requests": { "storage": "2Gi" } } } } } }
        })),
    )
    .await
    .expect("failed to patch storage");

    verifier
        .require_volume_claims_resized(&cluster, &Quantity("2Gi".to_string()))
        .await
        .expect("claims should be resized");

    delete_namespace(&client, ns).await;
}

/// Story: an operator shrinks a four-node cluster to three
///
/// Expected behavior:
/// - The StatefulSet settles at three members
/// - The removed member reports as decommissioning and drains to zero replicas
#[tokio::test]
#[ignore = "requires kind cluster with the operator - run with: cargo test --test kind -- --ignored"]
async fn story_decommissioned_node_drains() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let ns = "crdb-e2e-decommission";
    fresh_namespace(&client, ns).await.expect("namespace");

    let cluster = create_cluster(&client, ns, &sample_cluster("crdb", 4)).await;
    let verifier = verifier(client.clone(), ns);
    verifier
        .require_cluster_ready(&cluster, Some(std::time::Duration::from_secs(600)))
        .await
        .expect("cluster should become ready");

    let api: Api<CrdbCluster> = Api::namespaced(client.clone(), ns);
    let shrunk = api
        .patch(
            "crdb",
            &PatchParams::default(),
            &Patch::Merge(json!({ "spec": { "nodes": 3 } })),
        )
        .await
        .expect("failed to scale down");

    verifier
        .require_decommission_node(&shrunk, 3)
        .await
        .expect("node should drain");

    delete_namespace(&client, ns).await;
}
