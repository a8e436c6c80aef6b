pub mod error;
pub mod image_reference;
pub mod manifest;

// Re-export the main types for convenience
pub use error::{ImageReferenceError, ManifestError};
pub use image_reference::ImageReference;
pub use manifest::ManifestRecord;
