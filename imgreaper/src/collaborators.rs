//! Capabilities the collector needs from the outside world.

use async_trait::async_trait;
use imageref::{ImageReference, ManifestRecord};

use crate::error::Result;

/// Enumerates and deletes manifests in one registry
#[async_trait]
pub trait RegistryService: Send + Sync {
    async fn list_repositories(&self) -> Result<Vec<String>>;

    /// Manifests of `repository`, ascending by last update time
    async fn list_manifests(&self, repository: &str) -> Result<Vec<ManifestRecord>>;

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()>;
}

/// Reports the images currently declared by deployed workloads
#[async_trait]
pub trait ClusterStateService: Send + Sync {
    /// Image strings that do not parse as registry references are left out
    async fn list_active_image_references(&self) -> Result<Vec<ImageReference>>;
}

/// Tells whether this process runs in the cluster allowed to clean up
#[async_trait]
pub trait LeadershipCheck: Send + Sync {
    async fn is_active_cluster(&self) -> bool;
}
