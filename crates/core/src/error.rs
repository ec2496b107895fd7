//! Error types for the engine core.

use thiserror::Error;

/// Main error type for the engine core.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Resource loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// Shader loading errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
