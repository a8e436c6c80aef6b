//! One end-to-end collection pass over a registry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use imageref::{ImageReference, ManifestRecord};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::classify::{RetentionPolicy, Verdict, classify};
use crate::collaborators::{ClusterStateService, LeadershipCheck, RegistryService};
use crate::error::Result;
use crate::metrics::ReaperMetrics;

const PROGRESS_EVERY: usize = 10;

/// Number of manifests per verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerdictCounts {
    counts: [u64; Verdict::ALL.len()],
}

impl VerdictCounts {
    pub fn record(&mut self, verdict: Verdict) {
        self.counts[verdict as usize] += 1;
    }

    pub fn get(&self, verdict: Verdict) -> u64 {
        self.counts[verdict as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Manifests classified for deletion, whether or not the delete ran
    pub fn deletions(&self) -> u64 {
        self.get(Verdict::DeleteTagged) + self.get(Verdict::DeleteUntagged)
    }

    pub fn merge(&mut self, other: &Self) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts) {
            *mine += theirs;
        }
    }
}

/// Outcome of processing one repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySummary {
    pub counts: VerdictCounts,
    /// Manifests actually removed from the registry
    pub deleted: u64,
    pub delete_errors: Vec<String>,
    /// Set when the manifest listing failed and the repository was skipped
    pub list_error: Option<String>,
}

/// Outcome of one collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    /// The pass did nothing because this is not the active cluster
    pub skipped_inactive: bool,
    pub repositories: BTreeMap<String, RepositorySummary>,
    pub whitelisted: Vec<String>,
    pub duration: Duration,
}

impl PassSummary {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            skipped_inactive: false,
            repositories: BTreeMap::new(),
            whitelisted: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn totals(&self) -> VerdictCounts {
        let mut totals = VerdictCounts::default();
        for repository in self.repositories.values() {
            totals.merge(&repository.counts);
        }
        totals
    }

    pub fn deleted(&self) -> u64 {
        self.repositories.values().map(|r| r.deleted).sum()
    }

    /// Manifests left in the registry, counting failed deletes
    pub fn retained(&self) -> u64 {
        self.repositories
            .values()
            .map(|r| r.counts.total() - r.counts.deletions() + r.delete_errors.len() as u64)
            .sum()
    }

    pub fn error_count(&self) -> usize {
        self.repositories
            .values()
            .map(|r| r.delete_errors.len() + usize::from(r.list_error.is_some()))
            .sum()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Tags referenced by workloads, per repository.
///
/// Repository names compare case-insensitively, tags exactly.
#[derive(Debug, Default)]
pub struct ClusterReferences {
    by_repository: HashMap<String, HashSet<String>>,
}

impl ClusterReferences {
    pub fn tags_for(&self, repository: &str) -> Option<&HashSet<String>> {
        self.by_repository.get(&repository.to_lowercase())
    }
}

impl FromIterator<ImageReference> for ClusterReferences {
    fn from_iter<T: IntoIterator<Item = ImageReference>>(iter: T) -> Self {
        let mut by_repository: HashMap<String, HashSet<String>> = HashMap::new();
        for image in iter {
            by_repository
                .entry(image.repository.to_lowercase())
                .or_default()
                .insert(image.tag);
        }
        Self { by_repository }
    }
}

/// Drives collection passes against injected collaborators
pub struct Collector {
    registry: Arc<dyn RegistryService>,
    cluster: Arc<dyn ClusterStateService>,
    leadership: Arc<dyn LeadershipCheck>,
    policy: RetentionPolicy,
    perform_delete: bool,
    whitelist: HashSet<String>,
    metrics: ReaperMetrics,
}

impl Collector {
    pub fn new(
        registry: Arc<dyn RegistryService>,
        cluster: Arc<dyn ClusterStateService>,
        leadership: Arc<dyn LeadershipCheck>,
        policy: RetentionPolicy,
        metrics: ReaperMetrics,
    ) -> Self {
        Self {
            registry,
            cluster,
            leadership,
            policy,
            perform_delete: false,
            whitelist: HashSet::new(),
            metrics,
        }
    }

    /// Actually delete manifests instead of only logging them
    pub fn perform_delete(mut self, perform_delete: bool) -> Self {
        self.perform_delete = perform_delete;
        self
    }

    /// Repositories that are never touched, matched case-insensitively
    pub fn whitelist<I, S>(mut self, repositories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist = repositories
            .into_iter()
            .map(|r| r.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    fn is_whitelisted(&self, repository: &str) -> bool {
        self.whitelist.contains(&repository.to_lowercase())
    }

    /// Run one pass.
    ///
    /// Returns an error only when the cluster references or the repository
    /// list cannot be fetched; per-repository failures end up in the summary.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let span = info_span!("pass", pass_id = %Uuid::new_v4(), dry_run = !self.perform_delete);
        let result = self.execute().instrument(span).await;

        let outcome = match &result {
            Ok(summary) if summary.skipped_inactive => "inactive",
            Ok(_) => "completed",
            Err(_) => "aborted",
        };
        self.metrics.add_pass(outcome);
        result
    }

    async fn execute(&self) -> Result<PassSummary> {
        let started = Instant::now();
        let now = Utc::now();
        let mut summary = PassSummary::new(now);

        if !self.leadership.is_active_cluster().await {
            info!("Not running in the active cluster, skipping pass");
            summary.skipped_inactive = true;
            return Ok(summary);
        }

        let references: ClusterReferences = self
            .cluster
            .list_active_image_references()
            .await
            .inspect_err(|e| error!("Unable to list images in cluster, aborting pass: {}", e))?
            .into_iter()
            .collect();

        let repositories = self
            .registry
            .list_repositories()
            .await
            .inspect_err(|e| error!("Unable to list repositories, aborting pass: {}", e))?;

        let total = repositories.len();
        let mut processed = 0;
        for repository in repositories {
            if self.is_whitelisted(&repository) {
                info!(repository = %repository, "Skip repository, as it is whitelisted");
                summary.whitelisted.push(repository);
                continue;
            }

            let result = self.process_repository(&repository, &references, now).await;
            summary.repositories.insert(repository, result);

            processed += 1;
            if processed % PROGRESS_EVERY == 0 {
                info!("Processed {} out of {} repositories", processed, total);
            }
        }

        summary.duration = started.elapsed();
        info!(
            repositories = summary.repositories.len(),
            deleted = summary.deleted(),
            errors = summary.error_count(),
            "It took {:?} to run",
            summary.duration
        );
        Ok(summary)
    }

    async fn process_repository(
        &self,
        repository: &str,
        references: &ClusterReferences,
        now: DateTime<Utc>,
    ) -> RepositorySummary {
        let mut result = RepositorySummary::default();

        debug!(repository = %repository, "Process repository");
        let mut manifests = match self.registry.list_manifests(repository).await {
            Ok(manifests) => manifests,
            Err(e) => {
                warn!(repository = %repository, "Skipping repository: {}", e);
                self.metrics.add_list_error(repository);
                result.list_error = Some(e.to_string());
                return result;
            }
        };
        // Oldest first, so the quota always protects the newest untagged manifests
        manifests.sort_by_key(|m| m.last_update_time);

        let empty = HashSet::new();
        let referenced = references.tags_for(repository).unwrap_or(&empty);
        let mut remaining_untagged = manifests.iter().filter(|m| self.policy.is_untagged(m)).count();

        for manifest in &manifests {
            let verdict = classify(manifest, referenced, &self.policy, now, remaining_untagged);
            result.counts.record(verdict);
            let tagged = !self.policy.is_untagged(manifest);

            if !verdict.is_delete() {
                debug!(
                    repository = %repository,
                    digest = %manifest.digest,
                    tags = %tag_list(manifest),
                    %verdict,
                    "Retaining manifest"
                );
                self.metrics.add_retained(&self.policy.cluster_type, repository, tagged);
                continue;
            }

            if !self.perform_delete {
                info!(
                    repository = %repository,
                    digest = %manifest.digest,
                    tags = %tag_list(manifest),
                    %verdict,
                    "Would delete manifest (dry run)"
                );
            } else if let Err(e) = self.registry.delete_manifest(repository, &manifest.digest).await {
                error!(repository = %repository, digest = %manifest.digest, "{}", e);
                self.metrics.add_delete_error(repository);
                self.metrics.add_retained(&self.policy.cluster_type, repository, tagged);
                result.delete_errors.push(e.to_string());
                // The manifest stays; it counts towards the quota and is retried next pass
                continue;
            } else {
                info!(
                    repository = %repository,
                    digest = %manifest.digest,
                    tags = %tag_list(manifest),
                    "Deleted manifest"
                );
                result.deleted += 1;
                self.metrics.add_deleted(&self.policy.cluster_type, repository, tagged);
            }

            if verdict == Verdict::DeleteUntagged {
                remaining_untagged = remaining_untagged.saturating_sub(1);
            }
        }

        result
    }
}

fn tag_list(manifest: &ManifestRecord) -> String {
    manifest.tags.iter().cloned().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(repository: &str, tag: &str) -> ImageReference {
        ImageReference::new("myacr.azurecr.io".into(), repository.into(), tag.into())
    }

    #[test]
    fn test_references_group_by_repository() {
        let references: ClusterReferences = vec![
            image("web", "production-1"),
            image("Web", "production-2"),
            image("api", "production-9"),
        ]
        .into_iter()
        .collect();

        let web = references.tags_for("WEB").unwrap();
        assert_eq!(web.len(), 2);
        assert!(web.contains("production-1"));
        assert!(web.contains("production-2"));
        assert!(references.tags_for("worker").is_none());
    }

    #[test]
    fn test_verdict_counts() {
        let mut a = VerdictCounts::default();
        a.record(Verdict::DeleteTagged);
        a.record(Verdict::RetainQuota);
        a.record(Verdict::RetainQuota);

        let mut b = VerdictCounts::default();
        b.record(Verdict::DeleteUntagged);
        b.merge(&a);

        assert_eq!(b.get(Verdict::RetainQuota), 2);
        assert_eq!(b.deletions(), 2);
        assert_eq!(b.total(), 4);
    }

    #[test]
    fn test_summary_error_count() {
        let mut summary = PassSummary::new(Utc::now());
        summary.repositories.insert(
            "a".into(),
            RepositorySummary {
                list_error: Some("boom".into()),
                ..Default::default()
            },
        );
        let mut counts = VerdictCounts::default();
        for _ in 0..5 {
            counts.record(Verdict::DeleteTagged);
        }
        counts.record(Verdict::RetainReferenced);
        summary.repositories.insert(
            "b".into(),
            RepositorySummary {
                counts,
                deleted: 3,
                delete_errors: vec!["x".into(), "y".into()],
                ..Default::default()
            },
        );
        assert_eq!(summary.error_count(), 3);
        assert_eq!(summary.deleted(), 3);
        // the referenced manifest plus the two failed deletes
        assert_eq!(summary.retained(), 3);
        assert!(summary.has_errors());
    }
}
