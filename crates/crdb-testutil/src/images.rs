//! Expected database image resolution
//!
//! A cluster either names its image explicitly or pins a database version.
//! Versions are mapped to images through a related-image catalog whose keys
//! look like `RELATED_IMAGE_COCKROACH_v21_1_0`.

#[cfg(test)]
use mockall::automock;

use crdb_common::crd::CrdbCluster;
use crdb_common::naming::IMAGE_COMPONENT;
use crdb_common::Error;

/// Source of version-to-image mappings
#[cfg_attr(test, automock)]
pub trait ImageCatalog: Send + Sync {
    /// Image registered under `key`, if any
    fn lookup(&self, key: &str) -> Option<String>;
}

/// [`ImageCatalog`] reading process environment variables
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvImageCatalog;

impl ImageCatalog for EnvImageCatalog {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Catalog key for a component at a version
pub fn related_image_key(component: &str, version: &str) -> String {
    format!("RELATED_IMAGE_{component}_{}", version.replace('.', "_"))
}

/// Image the database containers of `cluster` are expected to run
///
/// An explicit image wins. Otherwise the version is looked up in the
/// catalog; a missing entry or a cluster with neither setting is a
/// configuration error.
pub fn expected_image(cluster: &CrdbCluster, catalog: &dyn ImageCatalog) -> Result<String, Error> {
    if let Some(image) = cluster.spec.explicit_image() {
        return Ok(image.to_string());
    }

    let version = cluster
        .spec
        .cockroach_db_version
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::config("cluster specifies neither an image nor a version"))?;

    let key = related_image_key(IMAGE_COMPONENT, version);
    catalog
        .lookup(&key)
        .ok_or_else(|| Error::config(format!("no image registered under {key}")))
}
