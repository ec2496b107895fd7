//! Vulkan frame resources.
//!
//! - [`SwapchainTarget`] is the [`SurfaceTarget`] backed by a real swapchain.
//!   It owns the depth buffer and all frame synchronization: per-slot
//!   image-available semaphores and in-flight fences, and per-image
//!   render-finished semaphores.
//! - [`FrameManager`] owns the per-slot command buffers, global uniform
//!   buffers and global descriptor sets.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight[slot] (previous use of this slot has finished)
//! 2. Acquire an image, signalling image_available[slot]
//! 3. Record the slot's command buffer
//! 4. Reset in_flight[slot], then submit: wait image_available[slot], signal
//!    render_finished[image] and in_flight[slot]
//! 5. Present, waiting on render_finished[image]
//! ```
//!
//! The fence stays signaled until the submit, so a frame abandoned during
//! recording never leaves its slot unwaitable. Releasing an abandoned image
//! submits an empty batch that consumes image_available[slot] and signals
//! in_flight[slot] in its place.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::descriptor::{
    DescriptorPool, DescriptorPoolBuilder, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    DescriptorWriter, buffer_info,
};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::swapchain::{SurfaceStatus, Swapchain};
use ember_rhi::sync::{Fence, Semaphore};
use ember_rhi::{RhiError, RhiResult};

use crate::depth_buffer::DepthBuffer;
use crate::frame::SurfaceTarget;
use crate::ubo::GlobalUbo;
use crate::MAX_FRAMES_IN_FLIGHT;

/// Swapchain, depth buffer and frame synchronization.
pub struct SwapchainTarget {
    device: Arc<Device>,
    image_available: Vec<Semaphore>,
    in_flight: Vec<Fence>,
    render_finished: Vec<Semaphore>,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
}

impl SwapchainTarget {
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        present_mode: vk::PresentModeKHR,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(instance, device.clone(), surface, extent, present_mode)?;
        let depth_buffer = DepthBuffer::new(device.clone(), swapchain.extent(), depth_format)?;

        let image_available = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        // Signaled so the first wait on each slot returns immediately.
        let in_flight = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| Fence::new(device.clone(), true))
            .collect::<RhiResult<Vec<_>>>()?;
        let render_finished = create_semaphores(&device, swapchain.image_count())?;

        info!(
            "Frame synchronization ready: {} slots, {} images",
            MAX_FRAMES_IN_FLIGHT,
            swapchain.image_count()
        );

        Ok(Self {
            device,
            image_available,
            in_flight,
            render_finished,
            depth_buffer,
            swapchain,
        })
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn depth_buffer(&self) -> &DepthBuffer {
        &self.depth_buffer
    }

    /// Submits `command_buffer` for `slot`, rendering into `image_index`.
    pub fn submit(
        &self,
        slot: usize,
        image_index: u32,
        command_buffer: &CommandBuffer,
    ) -> RhiResult<()> {
        let wait_semaphores = [self.slot_semaphore(slot)?.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.image_semaphore(image_index)?.handle()];
        let command_buffers = [command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = self.slot_fence(slot)?;
        fence.reset()?;
        // SAFETY: the buffer finished recording and the fence was just reset.
        unsafe { self.device.submit_graphics(&[submit_info], fence.handle()) }
    }

    fn slot_semaphore(&self, slot: usize) -> RhiResult<&Semaphore> {
        self.image_available
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("Frame slot {} out of range", slot)))
    }

    fn slot_fence(&self, slot: usize) -> RhiResult<&Fence> {
        self.in_flight
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("Frame slot {} out of range", slot)))
    }

    fn image_semaphore(&self, image_index: u32) -> RhiResult<&Semaphore> {
        self.render_finished.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Swapchain image {} out of range", image_index))
        })
    }
}

impl SurfaceTarget for SwapchainTarget {
    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<(Option<u32>, SurfaceStatus)> {
        let fence = self.slot_fence(slot)?;
        fence.wait(u64::MAX)?;

        let semaphore = self.slot_semaphore(slot)?.handle();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> RhiResult<SurfaceStatus> {
        let wait = self.image_semaphore(image_index)?.handle();
        self.swapchain
            .present(self.device.present_queue(), image_index, wait)
    }

    fn release(&mut self, slot: usize, _image_index: u32) -> RhiResult<()> {
        let wait_semaphores = [self.slot_semaphore(slot)?.handle()];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);

        let fence = self.slot_fence(slot)?;
        fence.reset()?;
        // SAFETY: the batch records nothing; it only waits the acquire
        // semaphore and signals the slot fence.
        unsafe { self.device.submit_graphics(&[submit_info], fence.handle()) }
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        // Waits for the device to go idle, so nothing below is in use.
        if !self.swapchain.recreate(extent)? {
            return Ok(false);
        }

        let depth_format = self.depth_buffer.format();
        self.depth_buffer =
            DepthBuffer::new(self.device.clone(), self.swapchain.extent(), depth_format)?;

        if self.render_finished.len() != self.swapchain.image_count() as usize {
            debug!(
                "Swapchain image count changed from {} to {}",
                self.render_finished.len(),
                self.swapchain.image_count()
            );
            self.render_finished = create_semaphores(&self.device, self.swapchain.image_count())?;
        }
        Ok(true)
    }
}

fn create_semaphores(device: &Arc<Device>, count: u32) -> RhiResult<Vec<Semaphore>> {
    (0..count).map(|_| Semaphore::new(device.clone())).collect()
}

/// Resources recorded or written by the CPU for one frame slot.
pub struct FrameData {
    command_buffer: CommandBuffer,
    global_ubo: Buffer,
    global_set: vk::DescriptorSet,
}

impl FrameData {
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn global_set(&self) -> vk::DescriptorSet {
        self.global_set
    }

    /// Copies `ubo` into the slot's uniform buffer and flushes it.
    pub fn write_global_ubo(&self, ubo: &GlobalUbo) -> RhiResult<()> {
        self.global_ubo.write_data(0, bytemuck::bytes_of(ubo))?;
        self.global_ubo.flush()
    }
}

/// Per-slot command buffers, global uniform buffers and global descriptor sets.
///
/// The global set layout is set 0 of every pipeline: binding 0 is the
/// [`GlobalUbo`], visible to vertex and fragment stages.
pub struct FrameManager {
    frames: Vec<FrameData>,
    global_pool: DescriptorPool,
    global_layout: DescriptorSetLayout,
    command_pool: CommandPool,
}

impl FrameManager {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let (graphics_family, _) = device.queue_families().require()?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let global_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .build(device.clone())?;

        let slots = MAX_FRAMES_IN_FLIGHT as u32;
        let global_pool = DescriptorPoolBuilder::new()
            .max_sets(slots)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, slots)
            .build(device.clone())?;

        let command_buffers = command_pool.allocate_command_buffers(slots)?;
        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (i, command_buffer) in command_buffers.into_iter().enumerate() {
            let global_ubo = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                GlobalUbo::SIZE as vk::DeviceSize,
            )?;

            let mut writer = DescriptorWriter::new(&global_layout, &global_pool);
            writer.write_buffer(
                0,
                buffer_info(global_ubo.handle(), 0, GlobalUbo::SIZE as vk::DeviceSize),
            )?;
            let global_set = writer.build()?;

            debug!("Created frame data for slot {}", i);
            frames.push(FrameData {
                command_buffer,
                global_ubo,
                global_set,
            });
        }

        info!(
            "Frame manager created with {} frames in flight",
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            frames,
            global_pool,
            global_layout,
            command_pool,
        })
    }

    /// Resources of `slot`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if `slot` is not below [`MAX_FRAMES_IN_FLIGHT`].
    pub fn frame(&self, slot: usize) -> RhiResult<&FrameData> {
        self.frames
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("Frame slot {} out of range", slot)))
    }

    #[inline]
    pub fn global_layout(&self) -> &DescriptorSetLayout {
        &self.global_layout
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 4);
    }

    #[test]
    fn test_frame_resources_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
        assert_send::<SwapchainTarget>();
    }
}
