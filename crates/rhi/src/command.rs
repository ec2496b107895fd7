//! Command pool and command buffer recording.
//!
//! - [`CommandPool`] owns a `VkCommandPool` for one queue family.
//! - [`CommandBuffer`] wraps a primary buffer with the recording calls the
//!   renderer uses.
//! - [`record_layout_transition`] records an image layout change and is shared
//!   by frame recording and one-shot texture uploads.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so each frame slot can re-record its
/// buffer without resetting the whole pool.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!("Command pool created for queue family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer {
                device: self.device.clone(),
                buffer,
            })
            .collect())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Frees every buffer allocated from the pool.
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed");
    }
}

/// Primary command buffer.
///
/// Freed together with its [`CommandPool`]; must not outlive it.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Resets and begins a one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            let device = self.device.handle();
            device.reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer)? };
        Ok(())
    }

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        unsafe { self.device.handle().cmd_end_rendering(self.buffer) };
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    /// Binds a `u32` index buffer.
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    /// Sets a full-extent viewport and scissor.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport::default()
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(extent);

        unsafe {
            let device = self.device.handle();
            device.cmd_set_viewport(self.buffer, 0, &[viewport]);
            device.cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw(self.buffer, vertex_count, instance_count, 0, 0);
        }
    }

    pub fn draw_indexed(&self, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, first_index, 0, 0);
        }
    }

    /// Pushes a plain-old-data block at offset 0.
    pub fn push_constants<T: Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    /// Records a layout transition for `image`. See [`record_layout_transition`].
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        record_layout_transition(
            self.device.handle(),
            self.buffer,
            image,
            aspect,
            old_layout,
            new_layout,
        )
    }
}

/// Stage and access masks for one side of a layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierScope {
    pub stage: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
}

/// Source and destination scopes for the transitions the engine performs.
///
/// Returns `None` for pairs nothing in the engine records.
pub fn transition_scopes(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Option<(BarrierScope, BarrierScope)> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let scope = |stage, access| BarrierScope { stage, access };

    let pair = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            scope(S::TOP_OF_PIPE, A::empty()),
            scope(S::TRANSFER, A::TRANSFER_WRITE),
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            scope(S::TRANSFER, A::TRANSFER_WRITE),
            scope(S::FRAGMENT_SHADER, A::SHADER_READ),
        ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            scope(S::COLOR_ATTACHMENT_OUTPUT, A::empty()),
            scope(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE),
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            scope(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE),
            scope(S::BOTTOM_OF_PIPE, A::empty()),
        ),
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL) => (
            scope(
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            scope(
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
        ),
        _ => return None,
    };

    Some(pair)
}

/// Records an image memory barrier moving `image` between layouts.
///
/// # Errors
///
/// [`RhiError::InvalidHandle`] when the pair has no known scopes.
pub fn record_layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<()> {
    let (src, dst) = transition_scopes(old_layout, new_layout).ok_or_else(|| {
        RhiError::InvalidHandle(format!(
            "Unsupported layout transition {:?} -> {:?}",
            old_layout, new_layout
        ))
    })?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .level_count(1)
                .layer_count(1),
        )
        .src_access_mask(src.access)
        .dst_access_mask(dst.access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src.stage,
            dst.stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions_are_known() {
        let (src, dst) = transition_scopes(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src.stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst.access, vk::AccessFlags::TRANSFER_WRITE);

        let (src, dst) = transition_scopes(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src.access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst.stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_present_transition_waits_for_color_writes() {
        let (src, dst) = transition_scopes(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
        .unwrap();
        assert_eq!(src.access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst.stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_unknown_transition_is_none() {
        assert!(
            transition_scopes(
                vk::ImageLayout::PRESENT_SRC_KHR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            )
            .is_none()
        );
    }
}
