//! Frame orchestration and render passes.
//!
//! This crate drives the per-frame protocol on top of `ember_rhi`:
//! - Frame slot cycling, acquisition and presentation ([`frame`])
//! - Per-slot synchronization and uniform buffers ([`frame_manager`])
//! - Uniform and push constant layouts shared with the shaders ([`ubo`])
//! - Mesh, textured mesh and point light passes ([`passes`])

mod depth_buffer;
mod error;
pub mod frame;
pub mod frame_manager;
pub mod mesh;
pub mod passes;
mod renderer;
pub mod ubo;
pub mod vertex;

pub use depth_buffer::{DepthBuffer, find_depth_format};
pub use error::{RendererError, RendererResult};
pub use frame::{FrameDriver, FrameSequencer, SurfaceTarget};
pub use mesh::GpuMesh;
pub use passes::{DirectionalLight, FrameContext, RenderPass, RenderScene};
pub use renderer::{Renderer, RendererSettings, present_mode_for};
pub use ubo::{GlobalUbo, MAX_LIGHTS, PointLightData};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
