use thiserror::Error;

/// Error type for image reference parsing
#[derive(Debug, Error)]
pub enum ImageReferenceError {
    #[error("Invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// Error type for decoding registry manifest listings
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Invalid manifest listing: {0}")]
    Json(#[from] serde_json::Error),
}
