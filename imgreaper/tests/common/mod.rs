#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use imageref::{ImageReference, ManifestRecord};
use imgreaper::classify::RetentionPolicy;
use imgreaper::collaborators::{ClusterStateService, LeadershipCheck, RegistryService};
use imgreaper::collector::Collector;
use imgreaper::error::{ReaperError, Result};
use imgreaper::metrics::ReaperMetrics;

pub const NO_TAGS: [&str; 0] = [];

// In-memory registry that forgets deleted manifests and records every delete
#[derive(Default)]
pub struct FakeRegistry {
    repositories: Vec<String>,
    manifests: Mutex<HashMap<String, Vec<ManifestRecord>>>,
    failing_listings: HashSet<String>,
    failing_deletes: HashSet<String>,
    repository_listing_fails: bool,
    pub listed: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(mut self, name: &str, manifests: Vec<ManifestRecord>) -> Self {
        self.repositories.push(name.to_string());
        self.manifests
            .get_mut()
            .unwrap()
            .insert(name.to_string(), manifests);
        self
    }

    pub fn failing_listing(mut self, repository: &str) -> Self {
        self.failing_listings.insert(repository.to_string());
        self
    }

    pub fn failing_delete(mut self, digest: &str) -> Self {
        self.failing_deletes.insert(digest.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.repository_listing_fails = true;
        self
    }

    pub fn deleted_digests(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, digest)| digest.clone())
            .collect()
    }
}

#[async_trait]
impl RegistryService for FakeRegistry {
    async fn list_repositories(&self) -> Result<Vec<String>> {
        if self.repository_listing_fails {
            return Err(ReaperError::unavailable("registry", "connection refused"));
        }
        Ok(self.repositories.clone())
    }

    async fn list_manifests(&self, repository: &str) -> Result<Vec<ManifestRecord>> {
        self.listed.lock().unwrap().push(repository.to_string());
        if self.failing_listings.contains(repository) {
            return Err(ReaperError::unavailable("registry", format!("cannot list {repository}")));
        }
        Ok(self
            .manifests
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_manifest(&self, repository: &str, digest: &str) -> Result<()> {
        if self.failing_deletes.contains(digest) {
            return Err(ReaperError::DeleteFailed {
                repository: repository.to_string(),
                digest: digest.to_string(),
                reason: "registry returned 500".to_string(),
            });
        }
        if let Some(manifests) = self.manifests.lock().unwrap().get_mut(repository) {
            manifests.retain(|m| m.digest != digest);
        }
        self.deleted
            .lock()
            .unwrap()
            .push((repository.to_string(), digest.to_string()));
        Ok(())
    }
}

pub struct FakeCluster {
    images: Vec<ImageReference>,
    fails: bool,
}

impl FakeCluster {
    pub fn new(images: &[&str]) -> Self {
        Self {
            images: images.iter().filter_map(|i| ImageReference::parse(i)).collect(),
            fails: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            images: Vec::new(),
            fails: true,
        }
    }
}

#[async_trait]
impl ClusterStateService for FakeCluster {
    async fn list_active_image_references(&self) -> Result<Vec<ImageReference>> {
        if self.fails {
            return Err(ReaperError::unavailable("cluster", "apiserver timeout"));
        }
        Ok(self.images.clone())
    }
}

pub struct StaticLeadership(pub bool);

#[async_trait]
impl LeadershipCheck for StaticLeadership {
    async fn is_active_cluster(&self) -> bool {
        self.0
    }
}

pub fn policy() -> RetentionPolicy {
    RetentionPolicy {
        cluster_type: "production".to_string(),
        cluster_types: vec![
            "development".to_string(),
            "production".to_string(),
            "playground".to_string(),
        ],
        grace_period: Duration::hours(2),
        delete_untagged: true,
        retain_latest_untagged: 5,
    }
}

pub fn manifest<const N: usize>(digest: &str, tags: [&str; N], age: Duration) -> ManifestRecord {
    ManifestRecord::new(digest, tags, Utc::now() - age)
}

/// `count` untagged manifests, oldest first, with digests `sha256:u0`, `sha256:u1`, ...
pub fn untagged_series(count: usize) -> Vec<ManifestRecord> {
    (0..count)
        .map(|i| manifest(&format!("sha256:u{i}"), NO_TAGS, Duration::days(100 - i as i64)))
        .collect()
}

pub struct Harness {
    pub registry: Arc<FakeRegistry>,
    pub metrics: ReaperMetrics,
    pub prometheus: prometheus::Registry,
}

impl Harness {
    pub fn new(registry: FakeRegistry) -> Self {
        let prometheus = prometheus::Registry::new();
        let metrics = ReaperMetrics::new(&prometheus).unwrap();
        Self {
            registry: Arc::new(registry),
            metrics,
            prometheus,
        }
    }

    pub fn collector(&self, cluster: FakeCluster, active: bool, policy: RetentionPolicy) -> Collector {
        Collector::new(
            self.registry.clone(),
            Arc::new(cluster),
            Arc::new(StaticLeadership(active)),
            policy,
            self.metrics.clone(),
        )
    }
}

pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}
