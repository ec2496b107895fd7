//! Depth attachment sized to the presentation chain.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::device::Device;
use ember_rhi::image::{Image, ImageDesc};
use ember_rhi::{RhiError, RhiResult};

/// Preferred depth format.
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first candidate whose optimal-tiling features include `required`.
pub fn pick_supported_format(
    candidates: &[vk::Format],
    required: vk::FormatFeatureFlags,
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| optimal_features(format).contains(required))
}

/// Finds a depth format usable as an attachment on `physical_device`.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    let format = pick_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| unsafe {
            instance
                .get_physical_device_format_properties(physical_device, format)
                .optimal_tiling_features
        },
    )
    .ok_or_else(|| RhiError::InvalidHandle("No supported depth format".to_string()))?;

    debug!("Depth format: {:?}", format);
    Ok(format)
}

/// Depth image and view. Recreated together with the swapchain.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        let image = Image::new(device, &ImageDesc::depth(format, extent))?;
        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );
        Ok(Self { image })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
