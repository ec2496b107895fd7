//! Window management using winit.
//!
//! The window reports its framebuffer extent, remembers whether a resize
//! happened since the renderer last looked, and creates the Vulkan surface.

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use ember_core::{Error, Result, WindowConfig};

/// RAII wrapper for a Vulkan surface.
///
/// The Vulkan instance must outlive this surface.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created by ash_window::create_surface from the same instance
        // as the loader, and destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// Converts a physical window size into a swapchain extent.
#[inline]
pub fn extent_from_size(size: PhysicalSize<u32>) -> vk::Extent2D {
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

/// Application window with resize tracking.
pub struct Window {
    window: Arc<WinitWindow>,
    extent: vk::Extent2D,
    resized: bool,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honor the requested size.
        let extent = extent_from_size(window.inner_size());
        info!("Window created: {}x{}", extent.width, extent.height);

        Ok(Self {
            window: Arc::new(window),
            extent,
            resized: false,
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current framebuffer extent. Zero while minimized.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width over height, or 1.0 while minimized.
    pub fn aspect_ratio(&self) -> f32 {
        if self.extent.height == 0 {
            1.0
        } else {
            self.extent.width as f32 / self.extent.height as f32
        }
    }

    /// Records a new framebuffer size and raises the resized flag.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
        self.resized = true;
        debug!("Window resized: {}x{}", width, height);
    }

    #[inline]
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    #[inline]
    pub fn reset_resized(&mut self) {
        self.resized = false;
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                Error::Vulkan(format!("Failed to enumerate required extensions: {}", e))
            })?;

        Ok(extensions.to_vec())
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// `instance` must have been created with [`Window::required_extensions`]
    /// enabled and must outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: entry and instance are valid; the handles come from a live
        // winit window. The surface is destroyed in Surface::drop.
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_from_size() {
        let extent = extent_from_size(PhysicalSize::new(640, 0));
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 0);
    }
}
