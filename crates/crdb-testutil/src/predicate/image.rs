//! Database container image rollout

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crdb_common::crd::CrdbCluster;
use crdb_common::naming::DB_CONTAINER_NAME;
use crdb_common::Error;

use super::Predicate;
use crate::images::{expected_image, ImageCatalog};
use crate::outcome::Outcome;
use crate::provider::SnapshotProvider;

/// Decide whether every member pod runs the expected image
///
/// Fewer pods than `required_members` means the rollout has not reached
/// every member yet.
pub fn images_outcome(
    pods: &[Pod],
    container: &str,
    expected: &str,
    required_members: usize,
) -> Outcome {
    if pods.len() < required_members {
        return Outcome::pending(format!(
            "{} of {required_members} member pods exist",
            pods.len()
        ));
    }

    for pod in pods {
        let image = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.containers.iter().find(|c| c.name == container))
            .map(|c| c.image.as_deref().unwrap_or_default());

        match image {
            None => {
                return Outcome::pending(format!(
                    "pod {} has no {container} container",
                    pod.name_any()
                ))
            }
            Some(image) if image != expected => {
                return Outcome::pending(format!(
                    "pod {} runs {image}, want {expected}",
                    pod.name_any()
                ))
            }
            Some(_) => {}
        }
    }

    Outcome::Converged
}

/// Every member pod's database container runs the expected image
pub struct ContainerImageMatches {
    provider: Arc<dyn SnapshotProvider>,
    selector: String,
    container: String,
    expected: String,
    required_members: usize,
}

impl ContainerImageMatches {
    /// Check pods matching `selector` for `expected` in `container`
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        selector: impl Into<String>,
        container: impl Into<String>,
        expected: impl Into<String>,
        required_members: usize,
    ) -> Self {
        Self {
            provider,
            selector: selector.into(),
            container: container.into(),
            expected: expected.into(),
            required_members,
        }
    }

    /// Build the check for a cluster, resolving its expected image up front
    pub fn for_cluster(
        provider: Arc<dyn SnapshotProvider>,
        cluster: &CrdbCluster,
        catalog: &dyn ImageCatalog,
    ) -> Result<Self, Error> {
        let expected = expected_image(cluster, catalog)?;
        Ok(Self::new(
            provider,
            cluster.member_selector(),
            DB_CONTAINER_NAME,
            expected,
            usize::try_from(cluster.spec.nodes).unwrap_or_default(),
        ))
    }

    /// Image the check waits for
    pub fn expected(&self) -> &str {
        &self.expected
    }
}

#[async_trait]
impl Predicate for ContainerImageMatches {
    fn name(&self) -> &str {
        "container-image-matches"
    }

    async fn evaluate(&self) -> Outcome {
        match self.provider.pods(&self.selector).await {
            Ok(pods) => images_outcome(
                &pods,
                &self.container,
                &self.expected,
                self.required_members,
            ),
            Err(e) => Outcome::Fatal(e),
        }
    }
}
