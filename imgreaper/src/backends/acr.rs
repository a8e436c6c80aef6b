use async_trait::async_trait;
use imageref::ManifestRecord;
use tracing::debug;

use super::run_command;
use crate::collaborators::RegistryService;
use crate::error::{ReaperError, Result};

/// Azure Container Registry accessed through the `az` command line tool
#[derive(Debug, Clone)]
pub struct AzureCliRegistry {
    az_path: String,
    registry: String,
}

impl AzureCliRegistry {
    pub fn new(az_path: impl Into<String>, registry: impl Into<String>) -> Self {
        Self {
            az_path: az_path.into(),
            registry: registry.into(),
        }
    }

    fn list_repositories_args(&self) -> Vec<&str> {
        vec!["acr", "repository", "list", "--name", self.registry.as_str()]
    }

    fn list_manifests_args<'a>(&'a self, repository: &'a str) -> Vec<&'a str> {
        vec![
            "acr",
            "manifest",
            "list-metadata",
            "--registry",
            self.registry.as_str(),
            "--name",
            repository,
            "--orderby",
            "time_asc",
        ]
    }

    fn delete_args<'a>(&'a self, image: &'a str) -> Vec<&'a str> {
        vec!["acr", "repository", "delete", "--name", self.registry.as_str(), "--image", image, "--yes"]
    }
}

fn parse_repositories(data: &[u8]) -> serde_json::Result<Vec<String>> {
    serde_json::from_slice(data)
}

#[async_trait]
impl RegistryService for AzureCliRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        let unavailable = |reason: String| {
            ReaperError::unavailable(
                "registry",
                format!("list repositories for registry {} failed: {}", self.registry, reason),
            )
        };

        let stdout = run_command(&self.az_path, &self.list_repositories_args())
            .await
            .map_err(unavailable)?;
        let repositories = parse_repositories(&stdout).map_err(|e| unavailable(e.to_string()))?;

        debug!(registry = %self.registry, count = repositories.len(), "Listed repositories");
        Ok(repositories)
    }

    async fn list_manifests(&self, repository: &str) -> Result<Vec<ManifestRecord>> {
        let unavailable = |reason: String| {
            ReaperError::unavailable(
                "registry",
                format!("list manifests for repository {} failed: {}", repository, reason),
            )
        };

        let stdout = run_command(&self.az_path, &self.list_manifests_args(repository))
            .await
            .map_err(unavailable)?;
        ManifestRecord::from_listing_sorted(&stdout).map_err(|e| unavailable(e.to_string()))
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()> {
        let image = format!("{}@{}", repository, digest);
        run_command(&self.az_path, &self.delete_args(&image))
            .await
            .map(|_| ())
            .map_err(|reason| ReaperError::DeleteFailed {
                repository: repository.to_string(),
                digest: digest.to_string(),
                reason,
            })
    }
}
