//! Opaque meshes without textures.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, trace};

use ember_resources::SubMeshMaterial;
use ember_rhi::descriptor::DescriptorSetLayout;
use ember_rhi::device::Device;
use ember_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};

use super::{
    AttachmentFormats, FrameContext, PUSH_STAGES, RenderPass, RenderScene, device_push_range,
    load_shader_pair,
};
use crate::error::RendererResult;
use crate::ubo::{MeshPushConstants, NO_TEXTURE};
use crate::vertex;

/// Draws every mesh object that has no textures, one push constant block
/// per sub-mesh.
pub struct MeshPass {
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl MeshPass {
    pub fn new(
        device: Arc<Device>,
        global_layout: &DescriptorSetLayout,
        formats: AttachmentFormats,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let push_range = device_push_range::<MeshPushConstants>(&device)?;
        let layout = PipelineLayout::new(device.clone(), &[global_layout.handle()], &[push_range])?;

        let (vertex_shader, fragment_shader) = load_shader_pair(&device, shader_dir, "mesh")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_input(
                vertex::binding_description(),
                &vertex::attribute_descriptions(),
            )
            .cull_mode(CullMode::None)
            .color_attachment_format(formats.color)
            .depth_attachment_format(formats.depth)
            .build(device, &layout)?;

        info!("Mesh pass ready");
        Ok(Self { pipeline, layout })
    }
}

impl RenderPass for MeshPass {
    fn name(&self) -> &str {
        "mesh"
    }

    fn record(&mut self, frame: &FrameContext<'_>, scene: &RenderScene) -> RendererResult<()> {
        let objects: Vec<_> = scene
            .meshes()
            .into_iter()
            .filter_map(|o| o.mesh.as_ref().filter(|m| !m.is_textured()).map(|m| (o, m)))
            .collect();
        if objects.is_empty() {
            return Ok(());
        }

        let cmd = frame.command_buffer;
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(self.layout.handle(), 0, &[frame.global_set]);

        for (object, mesh) in &objects {
            let model = object.transform.matrix();
            let normal = object.transform.normal_matrix();
            mesh.bind(cmd);

            for submesh in mesh.submeshes() {
                let diffuse = match submesh.material {
                    SubMeshMaterial::Color(color) => color,
                    SubMeshMaterial::Texture(_) => object.color.extend(1.0),
                };
                let push = MeshPushConstants::new(model, normal, diffuse, NO_TEXTURE);
                cmd.push_constants(self.layout.handle(), PUSH_STAGES, &push);
                mesh.draw_submesh(cmd, submesh);
            }
        }

        trace!("Mesh pass drew {} objects", objects.len());
        Ok(())
    }
}
