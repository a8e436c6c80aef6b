//! Per-manifest retention decision.
//!
//! [`classify`] performs no I/O and holds no state; the same inputs always
//! produce the same verdict. The caller owns the untagged quota bookkeeping.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use imageref::ManifestRecord;

/// Outcome of classifying one manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Tagged for this cluster type and no longer referenced
    DeleteTagged,
    /// Untagged, unreferenced and above the retention quota
    DeleteUntagged,
    /// Untagged, but untagged deletion is switched off
    RetainUntaggedDisabled,
    /// Untagged, but among the newest manifests the quota keeps
    RetainQuota,
    /// Some tag is still referenced by a workload
    RetainReferenced,
    /// Owned by another cluster type's lifecycle
    RetainDifferentClusterType,
    /// Updated too recently to be judged against the cluster snapshot
    SkipGracePeriod,
}

impl Verdict {
    pub const ALL: [Verdict; 7] = [
        Verdict::DeleteTagged,
        Verdict::DeleteUntagged,
        Verdict::RetainUntaggedDisabled,
        Verdict::RetainQuota,
        Verdict::RetainReferenced,
        Verdict::RetainDifferentClusterType,
        Verdict::SkipGracePeriod,
    ];

    pub fn is_delete(self) -> bool {
        matches!(self, Verdict::DeleteTagged | Verdict::DeleteUntagged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::DeleteTagged => "delete_tagged",
            Verdict::DeleteUntagged => "delete_untagged",
            Verdict::RetainUntaggedDisabled => "retain_untagged_disabled",
            Verdict::RetainQuota => "retain_quota",
            Verdict::RetainReferenced => "retain_referenced",
            Verdict::RetainDifferentClusterType => "retain_different_cluster_type",
            Verdict::SkipGracePeriod => "skip_grace_period",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings that shape every verdict of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Cluster type this collector acts for
    pub cluster_type: String,
    /// Every cluster type whose `<type>-` tag prefix marks a manifest as tagged
    pub cluster_types: Vec<String>,
    /// Minimum age before a manifest may be deleted
    pub grace_period: Duration,
    pub delete_untagged: bool,
    /// Number of untagged manifests always kept per repository
    pub retain_latest_untagged: usize,
}

impl RetentionPolicy {
    /// Ensure the current cluster type is one of the recognized prefixes,
    /// otherwise its own manifests would be classified as untagged.
    pub fn normalized(mut self) -> Self {
        if !self.cluster_types.contains(&self.cluster_type) {
            self.cluster_types.push(self.cluster_type.clone());
        }
        self
    }

    /// No tag carries a recognized cluster-type prefix
    pub fn is_untagged(&self, manifest: &ManifestRecord) -> bool {
        !manifest.is_tagged_for_any(&self.cluster_types)
    }

    /// A grace period reaching past the representable range protects the manifest
    pub fn within_grace_period(&self, manifest: &ManifestRecord, now: DateTime<Utc>) -> bool {
        manifest
            .last_update_time
            .checked_add_signed(self.grace_period)
            .is_none_or(|until| until > now)
    }
}

/// Decide what to do with one manifest.
///
/// `referenced_tags` are the tags workloads currently use from the manifest's
/// repository. `remaining_untagged` is the number of untagged manifests in the
/// repository not yet deleted; the caller decrements it after acting on a
/// [`Verdict::DeleteUntagged`]. Rules are evaluated in order, first match wins.
pub fn classify(
    manifest: &ManifestRecord,
    referenced_tags: &HashSet<String>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    remaining_untagged: usize,
) -> Verdict {
    if policy.within_grace_period(manifest, now) {
        return Verdict::SkipGracePeriod;
    }

    let referenced = manifest.tags.iter().any(|tag| referenced_tags.contains(tag));

    if policy.is_untagged(manifest) {
        if !policy.delete_untagged {
            Verdict::RetainUntaggedDisabled
        } else if referenced {
            Verdict::RetainReferenced
        } else if remaining_untagged <= policy.retain_latest_untagged {
            Verdict::RetainQuota
        } else {
            Verdict::DeleteUntagged
        }
    } else if !manifest.is_tagged_for(&policy.cluster_type) {
        Verdict::RetainDifferentClusterType
    } else if referenced {
        Verdict::RetainReferenced
    } else {
        Verdict::DeleteTagged
    }
}
