use std::fmt;
use std::str::FromStr;

use crate::error::ImageReferenceError;

/// A container image as declared by a running workload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry host, including a port if one was given
    pub registry: String,
    /// Repository path inside the registry
    pub repository: String,
    /// Tag the workload pins
    pub tag: String,
}

impl ImageReference {
    /// Create a new ImageReference
    pub fn new(registry: String, repository: String, tag: String) -> Self {
        Self {
            registry,
            repository,
            tag,
        }
    }

    /// Parse an image string of the form `<registry-host>/<repository>:<tag>`.
    ///
    /// The host ends at the first `/` and the tag starts after the last `:`
    /// of the remainder. Returns `None` when either separator is missing;
    /// such images (locally built, implicit Docker Hub, digest-only) are
    /// expected in live clusters and are simply not registry references.
    /// Case and host are kept exactly as written.
    pub fn parse(image: &str) -> Option<Self> {
        let (registry, remainder) = image.split_once('/')?;
        let (repository, tag) = remainder.rsplit_once(':')?;

        Some(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl FromStr for ImageReference {
    type Err = ImageReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ImageReferenceError::InvalidFormat(s.to_string()))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}
