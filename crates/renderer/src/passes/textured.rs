//! Textured meshes sampling from one combined image sampler array.
//!
//! Set 1 holds a small per-frame uniform block and every texture of every
//! textured mesh, concatenated in ascending object id order. The array length
//! follows the scene, so the set layout, pipeline and sets are rebuilt
//! whenever the total texture count changes. The descriptor pool outlives
//! rebuilds: old sets are freed back to it, and it is only replaced by a
//! larger one when it runs out of room.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Vec4;
use tracing::{debug, info, trace};

use ember_resources::SubMeshMaterial;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::descriptor::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorWriter, TextureArrayTracker, buffer_info,
};
use ember_rhi::device::Device;
use ember_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use ember_rhi::shader::Shader;
use ember_rhi::{RhiError, RhiResult};
use ember_scene::SceneObject;

use super::{
    AttachmentFormats, FrameContext, PUSH_STAGES, RenderPass, RenderScene, device_push_range,
    load_shader_pair,
};
use crate::error::RendererResult;
use crate::mesh::GpuMesh;
use crate::ubo::{MeshPushConstants, NO_TEXTURE, TextureSystemUbo};
use crate::vertex;
use crate::MAX_FRAMES_IN_FLIGHT;

/// Directional light applied by the textured shader.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    pub intensity: f32,
    pub position: Vec4,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            intensity: 0.0,
            position: Vec4::new(1.0, -3.0, -1.0, 1.0),
        }
    }
}

/// First array index of each mesh's textures, and the total array length.
pub fn texture_offsets(counts: impl IntoIterator<Item = usize>) -> (Vec<u32>, u32) {
    let mut offsets = Vec::new();
    let mut total = 0u32;
    for count in counts {
        offsets.push(total);
        total += count as u32;
    }
    (offsets, total)
}

/// Smallest per-set texture capacity the descriptor pool is created with.
const MIN_POOL_TEXTURES: u32 = 16;

/// Set 1 layout for an array of `texture_count` textures.
fn texture_set_layout(texture_count: u32) -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_binding(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            1,
        )
        .add_binding(
            1,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            texture_count,
        )
}

/// A pool with one set per frame slot, each holding up to `capacity` textures.
fn texture_pool(capacity: u32) -> DescriptorPoolBuilder {
    let slots = MAX_FRAMES_IN_FLIGHT as u32;
    DescriptorPoolBuilder::new()
        .max_sets(slots)
        .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, slots)
        .add_pool_size(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            slots.saturating_mul(capacity),
        )
        .pool_flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
}

/// Capacity for a replacement pool once `current` cannot hold `needed` textures.
fn grown_pool_capacity(current: u32, needed: u32) -> u32 {
    needed
        .max(current.saturating_mul(2))
        .max(MIN_POOL_TEXTURES)
}

/// Allocates one set of `layout` per frame slot.
fn allocate_slot_sets(
    pool: &DescriptorPool,
    layout: &DescriptorSetLayout,
) -> RhiResult<Vec<vk::DescriptorSet>> {
    (0..MAX_FRAMES_IN_FLIGHT)
        .map(|_| pool.allocate(layout))
        .collect()
}

/// An object, its mesh and the array index of the mesh's first texture.
type TexturedDraw<'a> = (&'a SceneObject<GpuMesh>, &'a GpuMesh, u32);

/// Objects to draw this frame, and the total texture count.
fn textured_objects(scene: &RenderScene) -> (Vec<TexturedDraw<'_>>, u32) {
    let objects: Vec<_> = scene
        .meshes()
        .into_iter()
        .filter_map(|o| o.mesh.as_deref().filter(|m| m.is_textured()).map(|m| (o, m)))
        .collect();
    let (offsets, total) = texture_offsets(objects.iter().map(|(_, m)| m.textures().len()));
    let draws = objects
        .into_iter()
        .zip(offsets)
        .map(|((o, m), base)| (o, m, base))
        .collect();
    (draws, total)
}

/// Layout-dependent objects, rebuilt together when the array length changes.
struct TextureBindings {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    sets: Vec<vk::DescriptorSet>,
    layout: DescriptorSetLayout,
}

pub struct TexturedPass {
    device: Arc<Device>,
    formats: AttachmentFormats,
    global_layout: vk::DescriptorSetLayout,
    vertex_shader: Shader,
    fragment_shader: Shader,
    ubo_buffers: Vec<Buffer>,
    tracker: TextureArrayTracker,
    bindings: Option<TextureBindings>,
    pool: Option<DescriptorPool>,
    /// Per-set texture capacity of `pool`.
    pool_capacity: u32,
    pub directional_light: DirectionalLight,
}

impl TexturedPass {
    /// Loads the shaders and per-slot uniform buffers. The pipeline is built
    /// on the first frame that has textures to draw.
    ///
    /// `global_layout` must outlive the pass.
    pub fn new(
        device: Arc<Device>,
        global_layout: &DescriptorSetLayout,
        formats: AttachmentFormats,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let (vertex_shader, fragment_shader) = load_shader_pair(&device, shader_dir, "textured")?;

        let ubo_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    TextureSystemUbo::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Textured pass ready");
        Ok(Self {
            device,
            formats,
            global_layout: global_layout.handle(),
            vertex_shader,
            fragment_shader,
            ubo_buffers,
            tracker: TextureArrayTracker::new(),
            bindings: None,
            pool: None,
            pool_capacity: 0,
            directional_light: DirectionalLight::default(),
        })
    }

    /// Rebuilds the bindings if the scene's texture count changed, then writes
    /// `slot`'s uniform block and descriptor set.
    ///
    /// Must run after the slot's fence has been waited on. A rebuild waits for
    /// the device to go idle.
    pub fn update(&mut self, slot: usize, scene: &RenderScene) -> RendererResult<()> {
        let (draws, texture_count) = textured_objects(scene);
        if texture_count == 0 {
            return Ok(());
        }

        if self.tracker.needs_rebuild(texture_count) {
            debug!(
                "Texture count changed from {:?} to {}, rebuilding bindings",
                self.tracker.built_count(),
                texture_count
            );
            self.device.wait_idle()?;
            self.rebuild_bindings(texture_count)?;
            self.tracker.mark_built(texture_count);
        }

        let ubo = TextureSystemUbo {
            texture_count: texture_count as i32,
            directional_light_intensity: self.directional_light.intensity,
            _padding: [0.0; 2],
            directional_light_position: self.directional_light.position,
        };
        let ubo_buffer = self.ubo_buffer(slot)?;
        ubo_buffer.write_data(0, bytemuck::bytes_of(&ubo))?;
        ubo_buffer.flush()?;

        let bindings = self.bindings()?;
        let set = *bindings.sets.get(slot).ok_or_else(|| slot_error(slot))?;
        let images: Vec<_> = draws
            .iter()
            .flat_map(|(_, mesh, _)| mesh.textures().iter().map(|t| t.descriptor_info()))
            .collect();

        let pool = self.pool.as_ref().ok_or_else(unbuilt_error)?;
        let mut writer = DescriptorWriter::new(&bindings.layout, pool);
        writer
            .write_buffer(
                0,
                buffer_info(ubo_buffer.handle(), 0, TextureSystemUbo::SIZE as vk::DeviceSize),
            )?
            .write_images(1, &images)?;
        writer.overwrite(set);
        Ok(())
    }

    /// Replaces the bindings with ones for `texture_count` textures. The
    /// device must be idle.
    fn rebuild_bindings(&mut self, texture_count: u32) -> RhiResult<()> {
        if let Some(old) = self.bindings.take()
            && let Some(pool) = &self.pool
        {
            pool.free(&old.layout, &old.sets)?;
        }

        let layout = texture_set_layout(texture_count).build(self.device.clone())?;
        let sets = self.allocate_sets(&layout, texture_count)?;

        let push_range = device_push_range::<MeshPushConstants>(&self.device)?;
        let pipeline_layout = PipelineLayout::new(
            self.device.clone(),
            &[self.global_layout, layout.handle()],
            &[push_range],
        )?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&self.vertex_shader)
            .fragment_shader(&self.fragment_shader)
            .vertex_input(
                vertex::binding_description(),
                &vertex::attribute_descriptions(),
            )
            .cull_mode(CullMode::None)
            .color_attachment_format(self.formats.color)
            .depth_attachment_format(self.formats.depth)
            .build(self.device.clone(), &pipeline_layout)?;

        info!("Textured pass bindings built for {} textures", texture_count);
        self.bindings = Some(TextureBindings {
            pipeline,
            pipeline_layout,
            sets,
            layout,
        });
        Ok(())
    }

    /// Allocates the per-slot sets, resetting the pool if it is fragmented and
    /// replacing it with a larger one if it is too small.
    fn allocate_sets(
        &mut self,
        layout: &DescriptorSetLayout,
        texture_count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        if let Some(pool) = &self.pool {
            match allocate_slot_sets(pool, layout) {
                Err(RhiError::PoolExhausted) => {
                    debug!("Textured descriptor pool exhausted, resetting it");
                    pool.reset()?;
                    match allocate_slot_sets(pool, layout) {
                        Err(RhiError::PoolExhausted) => {}
                        other => return other,
                    }
                }
                other => return other,
            }
        }

        let capacity = grown_pool_capacity(self.pool_capacity, texture_count);
        info!(
            "Creating textured descriptor pool for {} textures per set",
            capacity
        );
        self.pool = None;
        let pool = texture_pool(capacity).build(self.device.clone())?;
        let sets = allocate_slot_sets(&pool, layout)?;
        self.pool = Some(pool);
        self.pool_capacity = capacity;
        Ok(sets)
    }

    fn bindings(&self) -> RhiResult<&TextureBindings> {
        self.bindings.as_ref().ok_or_else(unbuilt_error)
    }

    fn ubo_buffer(&self, slot: usize) -> RhiResult<&Buffer> {
        self.ubo_buffers.get(slot).ok_or_else(|| slot_error(slot))
    }
}

fn slot_error(slot: usize) -> RhiError {
    RhiError::InvalidHandle(format!("Frame slot {} out of range", slot))
}

fn unbuilt_error() -> RhiError {
    RhiError::BindingViolation("texture bindings have not been built".to_string())
}

impl RenderPass for TexturedPass {
    fn name(&self) -> &str {
        "textured"
    }

    fn record(&mut self, frame: &FrameContext<'_>, scene: &RenderScene) -> RendererResult<()> {
        let (draws, texture_count) = textured_objects(scene);
        if texture_count == 0 {
            return Ok(());
        }
        self.tracker.check_bound(texture_count)?;

        let bindings = self.bindings()?;
        let set = *bindings.sets.get(frame.slot).ok_or_else(|| slot_error(frame.slot))?;
        let layout = bindings.pipeline_layout.handle();

        let cmd = frame.command_buffer;
        cmd.bind_graphics_pipeline(bindings.pipeline.handle());
        cmd.bind_descriptor_sets(layout, 0, &[frame.global_set, set]);

        for (object, mesh, base) in &draws {
            let model = object.transform.matrix();
            let normal = object.transform.normal_matrix();
            mesh.bind(cmd);

            for submesh in mesh.submeshes() {
                let (diffuse, texture_index) = match submesh.material {
                    SubMeshMaterial::Texture(index) => (Vec4::ONE, (base + index) as i32),
                    SubMeshMaterial::Color(color) => (color, NO_TEXTURE),
                };
                let push = MeshPushConstants::new(model, normal, diffuse, texture_index);
                cmd.push_constants(layout, PUSH_STAGES, &push);
                mesh.draw_submesh(cmd, submesh);
            }
        }

        trace!(
            "Textured pass drew {} objects with {} textures",
            draws.len(),
            texture_count
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_offsets() {
        let (offsets, total) = texture_offsets([2, 1, 3]);
        assert_eq!(offsets, vec![0, 2, 3]);
        assert_eq!(total, 6);
    }

    #[test]
    fn test_texture_offsets_empty() {
        let (offsets, total) = texture_offsets(std::iter::empty());
        assert!(offsets.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_growing_scene_triggers_rebuild() {
        let mut tracker = TextureArrayTracker::new();
        let (_, two) = texture_offsets([1, 1]);
        assert!(tracker.needs_rebuild(two));
        tracker.mark_built(two);

        let (_, three) = texture_offsets([1, 1, 1]);
        assert!(tracker.needs_rebuild(three));
        assert!(tracker.check_bound(three).is_err());
        tracker.mark_built(three);
        assert!(tracker.check_bound(three).is_ok());
        assert!(!tracker.needs_rebuild(three));
    }

    #[test]
    fn test_default_directional_light() {
        let light = DirectionalLight::default();
        assert_eq!(light.intensity, 0.0);
        assert_eq!(light.position, Vec4::new(1.0, -3.0, -1.0, 1.0));
    }

    #[test]
    fn test_small_pool_is_exhausted_by_larger_array() {
        let layout = texture_set_layout(3).build_bindings().unwrap();
        let mut budget = texture_pool(2).budget();

        let results: Vec<_> = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| budget.reserve(&layout))
            .collect();
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(RhiError::PoolExhausted)))
        );
    }

    #[test]
    fn test_grown_pool_holds_every_slot() {
        let layout = texture_set_layout(40).build_bindings().unwrap();
        let capacity = grown_pool_capacity(MIN_POOL_TEXTURES, 40);
        let mut budget = texture_pool(capacity).budget();

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            budget.reserve(&layout).unwrap();
        }
        // One set per slot, no more.
        assert!(matches!(
            budget.reserve(&layout),
            Err(RhiError::PoolExhausted)
        ));
    }

    #[test]
    fn test_freed_sets_make_room_for_rebuilt_layout() {
        let old = texture_set_layout(4).build_bindings().unwrap();
        let new = texture_set_layout(MIN_POOL_TEXTURES).build_bindings().unwrap();
        let mut budget = texture_pool(MIN_POOL_TEXTURES).budget();

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            budget.reserve(&old).unwrap();
        }
        assert!(budget.reserve(&new).is_err());

        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            budget.release(&old);
        }
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            budget.reserve(&new).unwrap();
        }
    }

    #[test]
    fn test_grown_pool_capacity() {
        assert_eq!(grown_pool_capacity(0, 3), MIN_POOL_TEXTURES);
        assert_eq!(grown_pool_capacity(MIN_POOL_TEXTURES, 17), 32);
        assert_eq!(grown_pool_capacity(MIN_POOL_TEXTURES, 40), 40);
        assert_eq!(grown_pool_capacity(u32::MAX, 1), u32::MAX);
    }
}
