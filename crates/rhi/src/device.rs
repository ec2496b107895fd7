//! Logical device, queues, memory allocator and one-shot transfer helpers.
//!
//! [`Device`] is shared through `Arc` by every GPU object in the engine. Besides
//! owning the `VkDevice` it provides the setup-time primitives used to fill
//! buffers and images:
//!
//! - [`Device::find_memory_type`]
//! - [`Device::one_shot`] and the copy helpers built on it
//!
//! One-shot submissions block until the graphics queue is idle. They are meant
//! for uploads during initialization, never for per-frame work.

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Vulkan logical device wrapper.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    /// Released in `Drop` before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Transient pool for one-shot command buffers.
    transfer_pool: Mutex<vk::CommandPool>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device, retrieves its queues and initializes the allocator.
    ///
    /// Enables the swapchain and dynamic rendering extensions, Vulkan 1.3 dynamic
    /// rendering and synchronization2, and sampler anisotropy.
    ///
    /// # Errors
    ///
    /// Returns an error if the device, the transfer command pool, or the
    /// allocator cannot be created.
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (graphics_family, present_family) = queue_families.require()?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!("Creating queues for families: {:?}", unique_families);

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .runtime_descriptor_array(true)
            .shader_sampled_image_array_non_uniform_indexing(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created on '{}'",
            physical_device_info.device_name()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved (graphics family {}, present family {})",
            graphics_family, present_family
        );

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family)
            .flags(
                vk::CommandPoolCreateFlags::TRANSIENT
                    | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            );
        let transfer_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe {
                    device.destroy_command_pool(transfer_pool, None);
                    device.destroy_device(None);
                }
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            memory_properties: physical_device_info.memory_properties,
            limits: physical_device_info.properties.limits,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            transfer_pool: Mutex::new(transfer_pool),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Device limits, used for sampler anisotropy and alignment queries.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Locks the GPU memory allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocatorPoisoned`] if another thread panicked while
    /// holding the lock.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Finds a memory type index matching `type_filter` with all of `properties`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] if none exists.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        crate::physical_device::find_memory_type(&self.memory_properties, type_filter, properties)
    }

    /// Waits for the device to become idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded and `fence` must be unsignaled
    /// and not in use by another submission.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Records commands with `record`, submits them and blocks until the graphics
    /// queue is idle. Nothing is submitted if `record` fails.
    ///
    /// The command buffer is freed on every path, including recording errors.
    pub fn one_shot<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> RhiResult<()>,
    {
        let pool = self
            .transfer_pool
            .lock()
            .map_err(|_| RhiError::InvalidHandle("transfer command pool poisoned".to_string()))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info)?[0] };

        let result = (|| -> RhiResult<()> {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            unsafe { self.device.begin_command_buffer(command_buffer, &begin_info)? };

            record(&self.device, command_buffer)?;

            unsafe { self.device.end_command_buffer(command_buffer)? };

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            unsafe {
                self.device
                    .queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())?;
                self.device.queue_wait_idle(self.graphics_queue)?;
            }
            Ok(())
        })();

        unsafe { self.device.free_command_buffers(*pool, &[command_buffer]) };
        result
    }

    /// Copies `size` bytes from `src` to `dst`, blocking until done.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> RhiResult<()> {
        self.one_shot(|device, cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        })
    }

    /// Copies tightly packed pixels from `src` into layer 0 of `image`, blocking until done.
    ///
    /// `image` must already be in `TRANSFER_DST_OPTIMAL` layout.
    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        self.one_shot(|device, cmd| {
            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .layer_count(1),
                )
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    src,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                )
            };
            Ok(())
        })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            if let Ok(pool) = self.transfer_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // Allocator memory blocks must be freed while the device is alive.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: all handles are plain Vulkan handles, `ash::Device` is Send + Sync,
// and the allocator and transfer pool sit behind mutexes.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_required_extensions() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }
}
