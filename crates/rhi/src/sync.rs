//! Semaphores and fences.
//!
//! Each frame slot owns one fence (CPU waits for the GPU) and one
//! image-available semaphore. Render-finished semaphores are kept per
//! swapchain image.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::RhiResult;

/// GPU-to-GPU synchronization between queue operations.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_semaphore(self.semaphore, None);
        }
    }
}

/// GPU-to-CPU synchronization.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled.
    ///
    /// Frame fences start signaled so the first wait on each slot returns at once.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        match unsafe { self.device.handle().get_fence_status(self.fence) } {
            Ok(signaled) => signaled,
            Err(e) => {
                error!("Fence status query failed: {:?}", e);
                false
            }
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Semaphore>();
        assert_send::<Fence>();
    }
}
