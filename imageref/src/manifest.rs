use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ManifestError;

/// One content-addressed image manifest stored in a registry repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    /// Content digest, e.g. `sha256:...`
    pub digest: String,
    /// Tags currently pointing at this digest
    pub tags: BTreeSet<String>,
    /// Most recent tag or push activity on this digest
    pub last_update_time: DateTime<Utc>,
}

/// Manifest entry as emitted by the registry listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    digest: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    last_update_time: DateTime<Utc>,
}

impl From<ListingEntry> for ManifestRecord {
    fn from(entry: ListingEntry) -> Self {
        Self {
            digest: entry.digest,
            tags: entry.tags.unwrap_or_default().into_iter().collect(),
            last_update_time: entry.last_update_time,
        }
    }
}

impl ManifestRecord {
    /// Create a new ManifestRecord
    pub fn new<I, S>(digest: impl Into<String>, tags: I, last_update_time: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            digest: digest.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            last_update_time,
        }
    }

    /// Decode a JSON manifest listing, keeping the order of the listing
    pub fn from_listing(data: &[u8]) -> Result<Vec<Self>, ManifestError> {
        let entries: Vec<ListingEntry> = serde_json::from_slice(data)?;
        Ok(entries.into_iter().map(Self::from).collect())
    }

    /// Decode a JSON manifest listing sorted ascending by last update time
    pub fn from_listing_sorted(data: &[u8]) -> Result<Vec<Self>, ManifestError> {
        let mut manifests = Self::from_listing(data)?;
        manifests.sort_by_key(|m| m.last_update_time);
        Ok(manifests)
    }

    /// Whether `tag` points at this manifest
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether some tag carries the `<cluster_type>-` prefix
    pub fn is_tagged_for(&self, cluster_type: &str) -> bool {
        self.tags.iter().any(|tag| {
            tag.strip_prefix(cluster_type)
                .is_some_and(|rest| rest.starts_with('-'))
        })
    }

    /// Whether some tag carries the prefix of any of the given cluster types
    pub fn is_tagged_for_any<S: AsRef<str>>(&self, cluster_types: &[S]) -> bool {
        cluster_types
            .iter()
            .any(|cluster_type| self.is_tagged_for(cluster_type.as_ref()))
    }
}
