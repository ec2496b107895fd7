//! GPU images with bound memory and a default view.
//!
//! Used for depth buffers and sampled textures. Swapchain images are owned by
//! the presentation engine and never wrapped here.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Parameters for a single-mip, single-layer 2D image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Depth attachment of the given extent.
    pub fn depth(format: vk::Format, extent: vk::Extent2D) -> Self {
        Self {
            name: "depth_buffer",
            width: extent.width,
            height: extent.height,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Sampled color image filled by a transfer.
    pub fn texture(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            name: "texture",
            width,
            height,
            format,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Rejects zero dimensions and an undefined format.
    pub fn validate(&self) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} dimensions must be greater than 0 (got {}x{})",
                self.name, self.width, self.height
            )));
        }
        if self.format == vk::Format::UNDEFINED {
            return Err(RhiError::InvalidHandle(format!(
                "{} format is undefined",
                self.name
            )));
        }
        Ok(())
    }
}

/// Device-local image, its memory and a 2D view over it.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        desc.validate()?;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        // From here on Drop releases whatever was created.
        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            desc: *desc,
        };

        let (memory, offset) = this
            .allocation
            .as_ref()
            .map(|a| unsafe { (a.memory(), a.offset()) })
            .ok_or_else(|| RhiError::InvalidHandle("missing allocation".to_string()))?;
        unsafe {
            this.device
                .handle()
                .bind_image_memory(this.image, memory, offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(this.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(desc.aspect)
                    .level_count(1)
                    .layer_count(1),
            );
        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} image: {}x{} ({:?})",
            desc.name, desc.width, desc.height, desc.format
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent()
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} image memory: {:?}", self.desc.name, e);
                    }
                }
                Err(e) => error!("Leaking {} image memory: {}", self.desc.name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_desc() {
        let desc = ImageDesc::depth(
            vk::Format::D32_SFLOAT,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        );
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(
            desc.usage
                .contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        );
        assert_eq!(desc.extent().width, 800);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_texture_desc_is_sampled_transfer_target() {
        let desc = ImageDesc::texture(4, 4, vk::Format::R8G8B8A8_SRGB);
        assert!(desc.usage.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!(desc.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let desc = ImageDesc::texture(0, 16, vk::Format::R8G8B8A8_SRGB);
        assert!(matches!(desc.validate(), Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_undefined_format_rejected() {
        let desc = ImageDesc::texture(16, 16, vk::Format::UNDEFINED);
        assert!(desc.validate().is_err());
    }
}
