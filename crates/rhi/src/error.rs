//! RHI error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    /// No GPU meets the queue, extension and feature requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type satisfies the filter and property mask
    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    NoSuitableMemoryType {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Surface format changed across a swapchain recreation
    #[error("Swapchain {what} format changed from {old:?} to {new:?}")]
    FormatChanged {
        what: &'static str,
        old: vk::Format,
        new: vk::Format,
    },

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A binding number was declared twice in one layout
    #[error("Descriptor binding {0} already declared")]
    DuplicateBinding(u32),

    /// A descriptor write does not match the layout
    #[error("Descriptor binding violation: {0}")]
    BindingViolation(String),

    /// The descriptor pool has no room for another set
    #[error("Descriptor pool exhausted")]
    PoolExhausted,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
