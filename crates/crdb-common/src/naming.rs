//! Naming conventions shared by the operator and the verification engine
//!
//! The operator derives every object it creates from the CrdbCluster name:
//! the StatefulSet carries the cluster name, pods are `<sts>-<ordinal>`, and
//! each pod is reachable at `<sts>-<ordinal>.<sts>.<namespace>` through the
//! headless service.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

use crate::crd::CrdbCluster;
use crate::Error;

/// Name of the database container in every member pod
pub const DB_CONTAINER_NAME: &str = "db";

/// Path of the administrative binary inside the database container
pub const COCKROACH_BINARY: &str = "/cockroach/cockroach";

/// Directory holding node certificates inside the database container
pub const CERTS_DIR: &str = "/cockroach/cockroach-certs/";

/// Component name used in related-image keys
pub const IMAGE_COMPONENT: &str = "COCKROACH";

/// Common label keys applied to every member pod
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Instance label key (carries the cluster name)
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Component label key
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";

/// Address of a StatefulSet member through its headless service
pub fn member_address(stateful_set: &str, ordinal: i32, namespace: &str) -> String {
    format!("{stateful_set}-{ordinal}.{stateful_set}.{namespace}")
}

/// Name of the pod with the given ordinal
pub fn member_pod_name(stateful_set: &str, ordinal: i32) -> String {
    format!("{stateful_set}-{ordinal}")
}

/// Render a label set as a `key=value,...` selector string
pub fn selector_from_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a `LabelSelector` as a selector string usable in list calls
///
/// Supports `matchLabels` and the `In`, `NotIn`, `Exists` and
/// `DoesNotExist` expression operators.
pub fn selector_string(selector: &LabelSelector) -> Result<String, Error> {
    let mut parts = Vec::new();

    if let Some(labels) = &selector.match_labels {
        parts.extend(labels.iter().map(|(k, v)| format!("{k}={v}")));
    }

    for expr in selector.match_expressions.iter().flatten() {
        let values = expr.values.clone().unwrap_or_default().join(",");
        let part = match expr.operator.as_str() {
            "In" => format!("{} in ({values})", expr.key),
            "NotIn" => format!("{} notin ({values})", expr.key),
            "Exists" => expr.key.clone(),
            "DoesNotExist" => format!("!{}", expr.key),
            other => {
                return Err(Error::config(format!(
                    "unsupported label selector operator {other:?} for key {}",
                    expr.key
                )))
            }
        };
        parts.push(part);
    }

    Ok(parts.join(","))
}

impl CrdbCluster {
    /// Name of the StatefulSet backing this cluster
    pub fn stateful_set_name(&self) -> String {
        self.name_any()
    }

    /// Labels carried by every member pod
    pub fn member_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            (LABEL_NAME.to_string(), "cockroachdb".to_string()),
            (LABEL_INSTANCE.to_string(), self.name_any()),
            (LABEL_COMPONENT.to_string(), "database".to_string()),
        ]);
        labels.extend(self.spec.additional_labels.clone());
        labels
    }

    /// Selector string matching every member pod
    pub fn member_selector(&self) -> String {
        selector_from_labels(&self.member_labels())
    }

    /// Flag that makes `cockroach` CLI commands match the cluster's security mode
    pub fn secure_mode_flag(&self) -> String {
        if self.spec.tls_enabled {
            format!("--certs-dir={CERTS_DIR}")
        } else {
            "--insecure".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::CrdbClusterSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn cluster(tls: bool) -> CrdbCluster {
        let mut spec: CrdbClusterSpec =
            serde_json::from_str(r#"{"nodes": 3}"#).expect("spec should parse");
        spec.tls_enabled = tls;
        spec.additional_labels
            .insert("team".to_string(), "storage".to_string());
        let mut cluster = CrdbCluster::new("crdb", spec);
        cluster.metadata.namespace = Some("db".to_string());
        cluster
    }

    #[test]
    fn member_address_follows_headless_service_dns() {
        assert_eq!(member_address("crdb", 3, "test-ns"), "crdb-3.crdb.test-ns");
        assert_eq!(member_pod_name("crdb", 0), "crdb-0");
    }

    #[test]
    fn member_selector_includes_additional_labels() {
        let c = cluster(false);
        assert_eq!(c.stateful_set_name(), "crdb");
        assert_eq!(
            c.member_selector(),
            "app.kubernetes.io/component=database,app.kubernetes.io/instance=crdb,\
             app.kubernetes.io/name=cockroachdb,team=storage"
        );
    }

    #[test]
    fn secure_mode_flag_tracks_tls() {
        assert_eq!(cluster(false).secure_mode_flag(), "--insecure");
        assert_eq!(
            cluster(true).secure_mode_flag(),
            "--certs-dir=/cockroach/cockroach-certs/"
        );
    }

    #[test]
    fn selector_string_renders_labels_and_expressions() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([(
                "app".to_string(),
                "crdb".to_string(),
            )])),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "tier".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["a".to_string(), "b".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "legacy".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
        };
        assert_eq!(
            selector_string(&selector).expect("selector should render"),
            "app=crdb,tier in (a,b),!legacy"
        );
    }

    #[test]
    fn selector_string_rejects_unknown_operator() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "Gt".to_string(),
                values: None,
            }]),
        };
        assert!(matches!(
            selector_string(&selector),
            Err(Error::Config { .. })
        ));
    }
}
