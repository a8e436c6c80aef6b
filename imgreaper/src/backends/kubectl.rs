use async_trait::async_trait;
use imageref::ImageReference;
use serde_json::Value;
use tracing::debug;

use super::run_command;
use crate::collaborators::ClusterStateService;
use crate::error::{ReaperError, Result};

/// Reads workload images from the cluster through `kubectl`.
///
/// Every string stored under an `image` key anywhere in the listed objects
/// counts, which covers pod templates as well as custom resources that
/// declare their component images directly.
#[derive(Debug, Clone)]
pub struct KubectlClusterState {
    kubectl_path: String,
    resources: Vec<String>,
}

impl KubectlClusterState {
    pub fn new(kubectl_path: impl Into<String>, resources: Vec<String>) -> Self {
        Self {
            kubectl_path: kubectl_path.into(),
            resources,
        }
    }
}

fn collect_images<'a>(value: &'a Value, images: &mut Vec<&'a str>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::String(image) if key == "image" => images.push(image),
                    _ => collect_images(value, images),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_images(item, images);
            }
        }
        _ => {}
    }
}

fn parse_image_references(listing: &Value) -> Vec<ImageReference> {
    let mut images = Vec::new();
    collect_images(listing, &mut images);

    images
        .into_iter()
        .filter_map(|image| {
            let parsed = ImageReference::parse(image);
            if parsed.is_none() {
                debug!(image, "Ignoring image that is not a registry reference");
            }
            parsed
        })
        .collect()
}

#[async_trait]
impl ClusterStateService for KubectlClusterState {
    async fn list_active_image_references(&self) -> Result<Vec<ImageReference>> {
        let mut references = Vec::new();

        for resource in &self.resources {
            let args = ["get", resource.as_str(), "--all-namespaces", "-o", "json"];
            let stdout = run_command(&self.kubectl_path, &args)
                .await
                .map_err(|e| ReaperError::unavailable("cluster", e))?;
            let listing: Value = serde_json::from_slice(&stdout).map_err(|e| {
                ReaperError::unavailable("cluster", format!("invalid {} listing: {}", resource, e))
            })?;

            let found = parse_image_references(&listing);
            debug!(resource = %resource, count = found.len(), "Listed workload images");
            references.extend(found);
        }

        Ok(references)
    }
}
