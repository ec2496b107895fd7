//! Error types for resource loading.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Loaded data is inconsistent (out-of-range index, wrong pixel count, ...).
    #[error("Invalid resource data: {0}")]
    InvalidData(String),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
