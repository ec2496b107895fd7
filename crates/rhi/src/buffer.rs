//! GPU buffers backed by gpu-allocator.
//!
//! Host-visible buffers (uniform, staging) are persistently mapped and written
//! with [`Buffer::write_data`]. Mesh data is uploaded once into device-local
//! memory through a staging copy ([`Buffer::new_device_local`]).

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, uploaded once
    Vertex,
    /// Index data, uploaded once
    Index,
    /// Per-frame shader uniforms, rewritten by the CPU
    Uniform,
    /// Source of a transfer
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Computes the `(offset, size)` of a flush range aligned to `atom`.
///
/// The start is rounded down and the end rounded up, then clipped to the buffer.
pub fn aligned_flush_range(
    offset: vk::DeviceSize,
    len: vk::DeviceSize,
    buffer_size: vk::DeviceSize,
    atom: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let atom = atom.max(1);
    let start = offset / atom * atom;
    let end = (offset + len).div_ceil(atom) * atom;
    let end = end.min(buffer_size.div_ceil(atom) * atom);
    (start, end - start)
}

/// GPU buffer with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a persistently mapped, host-visible buffer.
    ///
    /// # Errors
    ///
    /// Fails on zero size or if buffer creation or allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::create(device, usage, size, MemoryLocation::CpuToGpu, usage.to_vk_usage())
    }

    /// Creates a host-visible buffer initialized with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        buffer.flush()?;
        Ok(buffer)
    }

    /// Creates a device-local buffer and fills it from a temporary staging buffer.
    ///
    /// Blocks until the copy completes.
    pub fn new_device_local(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::create(
            device.clone(),
            usage,
            size,
            MemoryLocation::GpuOnly,
            usage.to_vk_usage() | vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        device.copy_buffer(staging.handle(), buffer.handle(), size)?;
        Ok(buffer)
    }

    fn create(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        location: MemoryLocation,
        vk_usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };

        // Drop cleans up if binding fails.
        let (memory, offset) = this
            .allocation
            .as_ref()
            .map(|a| unsafe { (a.memory(), a.offset()) })
            .ok_or_else(|| RhiError::InvalidHandle("missing allocation".to_string()))?;
        unsafe {
            this.device
                .handle()
                .bind_buffer_memory(this.buffer, memory, offset)?;
        }

        debug!("Created {} buffer: {} bytes ({:?})", usage.name(), size, location);
        Ok(this)
    }

    /// Writes `data` at `offset` into mapped memory.
    ///
    /// # Errors
    ///
    /// Fails if the buffer is not host-visible or the write overruns the buffer.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Makes host writes visible to the device.
    ///
    /// A no-op on host-coherent memory.
    pub fn flush(&self) -> RhiResult<()> {
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(());
        };
        let properties = allocation.memory_properties();
        if !properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
            || properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }

        let atom = self.device.limits().non_coherent_atom_size;
        let (start, size) = aligned_flush_range(
            allocation.offset(),
            self.size,
            allocation.offset() + allocation.size(),
            atom,
        );
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(start)
            .size(size);
        unsafe { self.device.handle().flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }

    #[test]
    fn test_flush_range_alignment() {
        // Unaligned allocation offset inside a 64-byte atom.
        assert_eq!(aligned_flush_range(100, 200, 1024, 64), (64, 256));
        // Already aligned.
        assert_eq!(aligned_flush_range(128, 64, 1024, 64), (128, 64));
    }

    #[test]
    fn test_flush_range_zero_atom() {
        assert_eq!(aligned_flush_range(10, 20, 100, 0), (10, 20));
    }
}
