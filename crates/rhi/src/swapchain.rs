//! Presentation chain: swapchain images, acquisition and presentation.
//!
//! Acquire and present report staleness through [`SurfaceStatus`] rather than
//! errors. `SUBOPTIMAL_KHR` and `ERROR_OUT_OF_DATE_KHR` both map to
//! [`SurfaceStatus::Stale`]; every other failure is a hard [`RhiError`].
//!
//! A stale chain is rebuilt with [`Swapchain::recreate`], which chains the old
//! handle into the new create info. A zero-area surface (minimized window) is
//! never turned into a swapchain; callers must wait for a positive extent.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Whether the chain still matches its surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The chain matches the surface.
    Optimal,
    /// The chain must be recreated before the next frame.
    Stale,
}

impl SurfaceStatus {
    #[inline]
    pub fn is_stale(self) -> bool {
        self == SurfaceStatus::Stale
    }

    /// Maps a `suboptimal` flag to a status.
    #[inline]
    pub fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            SurfaceStatus::Stale
        } else {
            SurfaceStatus::Optimal
        }
    }
}

/// Translates an acquire result into an image index and status.
///
/// Out-of-date surfaces yield `(None, Stale)`.
pub fn classify_acquire(
    result: Result<(u32, bool), vk::Result>,
) -> RhiResult<(Option<u32>, SurfaceStatus)> {
    match result {
        Ok((index, suboptimal)) => Ok((Some(index), SurfaceStatus::from_suboptimal(suboptimal))),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, SurfaceStatus::Stale)),
        Err(e) => Err(e.into()),
    }
}

/// Translates a present result into a status.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SurfaceStatus> {
    match result {
        Ok(suboptimal) => Ok(SurfaceStatus::from_suboptimal(suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
        Err(e) => Err(e.into()),
    }
}

/// Returns true when either dimension is zero.
#[inline]
pub fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Surface capabilities, formats and present modes.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries support details for a physical device and surface.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, min images {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain with its image views.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    preferred_present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Errors
    ///
    /// Fails on a zero-area extent, inadequate surface support, or Vulkan errors.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let mut this = Self {
            device,
            swapchain_loader,
            surface_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent,
            present_mode: vk::PresentModeKHR::FIFO,
            preferred_present_mode,
        };
        if !this.build(extent)? {
            return Err(RhiError::SwapchainError("Surface has zero area".to_string()));
        }
        Ok(this)
    }

    /// Rebuilds the chain for `extent`, passing the current handle as `old_swapchain`.
    ///
    /// Waits for the device to go idle first. Returns `false` and leaves the
    /// chain untouched when the surface currently has zero area (a minimized
    /// window whose resize event has not arrived yet); retry once it has area.
    ///
    /// # Errors
    ///
    /// [`RhiError::FormatChanged`] if the surface now reports a different
    /// color format.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        if is_zero_extent(extent) {
            debug!("Requested extent has zero area, deferring swapchain recreation");
            return Ok(false);
        }

        self.device.wait_idle()?;

        let old_format = self.format;
        info!("Recreating swapchain at {}x{}", extent.width, extent.height);
        if !self.build(extent)? {
            return Ok(false);
        }

        if self.format != old_format {
            return Err(RhiError::FormatChanged {
                what: "color",
                old: old_format,
                new: self.format,
            });
        }
        Ok(true)
    }

    /// Returns `false` without touching the chain if the surface has zero area.
    fn build(&mut self, requested: vk::Extent2D) -> RhiResult<bool> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let Some(extent) =
            usable_extent(&support.capabilities, requested.width, requested.height)
        else {
            debug!("Surface reports zero area, swapchain not rebuilt");
            return Ok(false);
        };

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.preferred_present_mode);
        let image_count = determine_image_count(&support.capabilities);

        let (graphics_family, present_family) = self.device.queue_families().require()?;
        let queue_family_indices = [graphics_family, present_family];
        let (sharing_mode, indices) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &queue_family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        // The old chain is retired once the new one exists.
        self.destroy_image_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;
        self.images.clear();

        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        self.image_views = create_image_views(&self.device, &images, surface_format.format)?;
        self.images = images;
        self.format = surface_format.format;
        self.color_space = surface_format.color_space;
        self.extent = extent;
        self.present_mode = present_mode;

        info!(
            "Swapchain ready: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            self.format,
            present_mode,
            self.images.len()
        );
        Ok(true)
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    ///
    /// Returns `(None, Stale)` when the surface is out of date.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> RhiResult<(Option<u32>, SurfaceStatus)> {
        classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queues image `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SurfaceStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at `index`, if any.
    #[inline]
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Returns the image view at `index`, if any.
    #[inline]
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{})",
                self.extent.width, self.extent.height
            );
        }
    }
}

/// Picks B8G8R8A8_SRGB / SRGB_NONLINEAR, then B8G8R8A8_UNORM, then the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format B8G8R8A8_UNORM");
        return format;
    }

    let first = formats.first().copied().unwrap_or(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    });
    warn!("Using first available surface format {:?}", first.format);
    first
}

/// Uses `preferred` when supported, otherwise FIFO (always available).
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        preferred
    } else {
        debug!("{:?} unsupported, using FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

/// Uses the surface's current extent when defined, otherwise clamps the request.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// [`choose_extent`], or `None` when the surface cannot be presented to
/// because it has zero area.
pub fn usable_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Option<vk::Extent2D> {
    let extent = choose_extent(capabilities, width, height);
    (!is_zero_extent(extent)).then_some(extent)
}

/// One more image than the minimum, capped by the maximum (0 means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_images,
            max_image_count: max_images,
            ..Default::default()
        }
    }

    #[test]
    fn test_acquire_out_of_date_is_stale() {
        let (index, status) = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(index, None);
        assert_eq!(status, SurfaceStatus::Stale);
    }

    #[test]
    fn test_acquire_suboptimal_is_stale_but_usable() {
        let (index, status) = classify_acquire(Ok((2, true))).unwrap();
        assert_eq!(index, Some(2));
        assert!(status.is_stale());

        let (index, status) = classify_acquire(Ok((0, false))).unwrap();
        assert_eq!(index, Some(0));
        assert_eq!(status, SurfaceStatus::Optimal);
    }

    #[test]
    fn test_acquire_device_lost_is_error() {
        let result = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_present_status() {
        assert_eq!(classify_present(Ok(false)).unwrap(), SurfaceStatus::Optimal);
        assert_eq!(classify_present(Ok(true)).unwrap(), SurfaceStatus::Stale);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SurfaceStatus::Stale
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_zero_extent() {
        assert!(is_zero_extent(vk::Extent2D {
            width: 0,
            height: 0
        }));
        assert!(is_zero_extent(vk::Extent2D {
            width: 800,
            height: 0
        }));
        assert!(!is_zero_extent(vk::Extent2D {
            width: 1,
            height: 1
        }));
    }

    #[test]
    fn test_minimized_surface_reports_zero_extent() {
        let minimized = caps((0, 0), 2, 3);
        assert!(is_zero_extent(choose_extent(&minimized, 800, 600)));
        assert_eq!(usable_extent(&minimized, 800, 600), None);

        let restored = caps((800, 600), 2, 3);
        assert_eq!(
            usable_extent(&restored, 800, 600),
            Some(vk::Extent2D {
                width: 800,
                height: 600
            })
        );
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn test_choose_present_mode_preference() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = caps((u32::MAX, u32::MAX), 2, 3);
        let extent = choose_extent(&capabilities, 8000, 600);
        assert_eq!((extent.width, extent.height), (4096, 600));

        let extent = choose_extent(&caps((1920, 1080), 2, 3), 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_determine_image_count() {
        assert_eq!(determine_image_count(&caps((1, 1), 2, 3)), 3);
        assert_eq!(determine_image_count(&caps((1, 1), 2, 2)), 2);
        assert_eq!(determine_image_count(&caps((1, 1), 2, 0)), 3);
    }

    #[test]
    fn test_selection_is_deterministic_for_same_surface() {
        // Two recreations against an unchanged surface pick the same configuration.
        let capabilities = caps((800, 600), 2, 8);
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let first = (
            determine_image_count(&capabilities),
            choose_surface_format(&formats).format,
            choose_extent(&capabilities, 800, 600),
        );
        let second = (
            determine_image_count(&capabilities),
            choose_surface_format(&formats).format,
            choose_extent(&capabilities, 800, 600),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
