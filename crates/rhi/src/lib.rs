//! Vulkan hardware interface for the Ember engine.
//!
//! Thin, owning wrappers over `ash`:
//! - instance, physical device selection and the logical device
//! - buffers, images and textures backed by `gpu-allocator`
//! - the swapchain and its surface status
//! - command recording, pipelines and shaders
//! - descriptor layouts, pools and validated writes
//! - semaphores and fences

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
