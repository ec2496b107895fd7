//! Meshes uploaded to the GPU.

use std::sync::Arc;

use tracing::info;

use ember_resources::{MeshData, SubMesh, TextureData};
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::CommandBuffer;
use ember_rhi::device::Device;
use ember_rhi::texture::Texture;

use crate::error::RendererResult;

/// Device-local vertex and index buffers, sub-mesh ranges and the textures
/// the sub-meshes reference.
pub struct GpuMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    submeshes: Vec<SubMesh>,
    textures: Vec<Texture>,
}

impl GpuMesh {
    /// Validates `data` against `textures` and uploads both.
    ///
    /// Blocks until the uploads complete.
    pub fn upload(
        device: Arc<Device>,
        data: &MeshData,
        textures: &[TextureData],
    ) -> RendererResult<Self> {
        data.validate(textures.len())?;

        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        let textures = textures
            .iter()
            .map(|t| Texture::from_rgba8(device.clone(), t.width(), t.height(), t.pixels()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Uploaded mesh: {} vertices, {} indices, {} sub-meshes, {} textures",
            data.vertices.len(),
            data.indices.len(),
            data.submeshes.len(),
            textures.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            submeshes: data.submeshes.clone(),
            textures,
        })
    }

    #[inline]
    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    #[inline]
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    #[inline]
    pub fn is_textured(&self) -> bool {
        !self.textures.is_empty()
    }

    pub fn bind(&self, command_buffer: &CommandBuffer) {
        command_buffer.bind_vertex_buffer(self.vertex_buffer.handle());
        command_buffer.bind_index_buffer(self.index_buffer.handle());
    }

    pub fn draw_submesh(&self, command_buffer: &CommandBuffer, submesh: &SubMesh) {
        command_buffer.draw_indexed(submesh.index_count, submesh.index_start);
    }
}
