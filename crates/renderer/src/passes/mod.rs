//! Render pass components.
//!
//! Each pass records the draws for one class of scene objects. The renderer
//! runs them in a fixed order inside one dynamic rendering scope: opaque
//! meshes, textured meshes, light billboards, then any overlays.

mod mesh;
mod point_light;
mod textured;

pub use mesh::MeshPass;
pub use point_light::{PointLightPass, orbit_step};
pub use textured::{DirectionalLight, TexturedPass, texture_offsets};

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::pipeline::push_constant_range;
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::{RhiError, RhiResult};
use ember_scene::{Camera, Scene};

use crate::error::RendererResult;
use crate::mesh::GpuMesh;

/// Scene type the renderer draws.
pub type RenderScene = Scene<GpuMesh>;

/// Everything a pass needs to record into the current frame.
pub struct FrameContext<'a> {
    pub slot: usize,
    pub frame_time: f32,
    pub command_buffer: &'a CommandBuffer,
    pub camera: &'a Camera,
    pub global_set: vk::DescriptorSet,
    pub extent: vk::Extent2D,
}

/// A unit recording draws for one class of objects.
///
/// Overlays implement this and are registered with
/// [`Renderer::add_overlay`](crate::Renderer::add_overlay); they run after the
/// built-in passes.
pub trait RenderPass {
    fn name(&self) -> &str;

    /// Records draw commands. Called inside the frame's rendering scope with
    /// viewport and scissor already set.
    fn record(&mut self, frame: &FrameContext<'_>, scene: &RenderScene) -> RendererResult<()>;
}

/// Color and depth formats pipelines are compiled against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// Loads `{name}.vert.spv` and `{name}.frag.spv` from `dir`.
pub(crate) fn load_shader_pair(
    device: &Arc<Device>,
    dir: &Path,
    name: &str,
) -> RhiResult<(Shader, Shader)> {
    let vertex = Shader::from_spirv_file(
        device.clone(),
        &dir.join(format!("{}.vert.spv", name)),
        ShaderStage::Vertex,
        "main",
    )?;
    let fragment = Shader::from_spirv_file(
        device.clone(),
        &dir.join(format!("{}.frag.spv", name)),
        ShaderStage::Fragment,
        "main",
    )?;
    Ok((vertex, fragment))
}

/// Push constant stages used by every pass.
pub(crate) const PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Checks a push constant block of `size` bytes against the device limit.
pub fn check_push_constant_size(size: u32, limit: u32) -> RhiResult<()> {
    if size > limit {
        return Err(RhiError::PipelineError(format!(
            "Push constant block of {} bytes exceeds the device limit of {}",
            size, limit
        )));
    }
    Ok(())
}

/// Push constant range for `T`, checked against `device`'s limits.
pub(crate) fn device_push_range<T>(device: &Device) -> RhiResult<vk::PushConstantRange> {
    let range = push_constant_range::<T>(PUSH_STAGES)?;
    check_push_constant_size(range.size, device.limits().max_push_constants_size)?;
    Ok(range)
}
