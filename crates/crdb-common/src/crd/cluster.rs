//! CrdbCluster Custom Resource Definition
//!
//! The CrdbCluster CRD represents a CockroachDB cluster managed by the
//! operator. The operator materializes it as a StatefulSet with one pod per
//! node and one persistent volume claim per pod and volume template.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::ClusterCondition;

/// Default SQL port for CockroachDB
pub const DEFAULT_SQL_PORT: i32 = 26257;

/// Specification for a CrdbCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crdb.cockroachlabs.com",
    version = "v1alpha1",
    kind = "CrdbCluster",
    plural = "crdbclusters",
    shortname = "crdb",
    status = "CrdbClusterStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CrdbClusterSpec {
    /// Number of database nodes
    pub nodes: i32,

    /// Explicit container image; takes precedence over `cockroach_db_version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PodImage>,

    /// Database version, resolved to an image through the related-image catalog
    #[serde(
        default,
        rename = "cockroachDBVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub cockroach_db_version: Option<String>,

    /// Labels added to every member pod on top of the common set
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_labels: BTreeMap<String, String>,

    /// Whether nodes run in secure mode with TLS certificates
    #[serde(default)]
    pub tls_enabled: bool,

    /// SQL port exposed by every node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_port: Option<i32>,
}

impl CrdbClusterSpec {
    /// Explicitly configured image name, if any and non-empty
    pub fn explicit_image(&self) -> Option<&str> {
        self.image
            .as_ref()
            .map(|i| i.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// SQL port, falling back to the database default
    pub fn sql_port(&self) -> i32 {
        self.sql_port.unwrap_or(DEFAULT_SQL_PORT)
    }
}

/// Container image reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodImage {
    /// Fully qualified image name
    #[serde(default)]
    pub name: String,

    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

/// Status for a CrdbCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrdbClusterStatus {
    /// Ordered condition list reported by the operator
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,

    /// Version of the database currently running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
