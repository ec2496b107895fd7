//! Main renderer orchestration.
//!
//! [`Renderer`] owns the Vulkan instance, device, presentation chain, frame
//! resources and render passes, and drives one frame through four steps:
//!
//! 1. [`Renderer::begin_frame`]: wait for the slot, acquire an image, begin recording
//! 2. [`Renderer::update`]: camera matrices, light carousel, uniform uploads
//! 3. [`Renderer::render`]: mesh, textured, point light passes, then overlays
//! 4. [`Renderer::end_frame`]: submit, present, recreate the chain if stale
//!
//! If a step fails after the image was acquired, the frame is abandoned: the
//! command buffer is closed, the image is released unpresented and the next
//! [`Renderer::begin_frame`] starts over on the same slot with a rebuilt chain.

use std::mem::ManuallyDrop;
use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use ember_core::{GraphicsConfig, PresentModePreference};
use ember_platform::{Surface, Window};
use ember_resources::{MeshData, TextureData};
use ember_rhi::device::Device;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::select_physical_device;
use ember_rhi::rendering::{color_attachment, depth_attachment};
use ember_rhi::RhiError;
use ember_scene::Camera;

use crate::depth_buffer::find_depth_format;
use crate::error::{RendererError, RendererResult};
use crate::frame::{FrameDriver, SurfaceTarget};
use crate::frame_manager::{FrameManager, SwapchainTarget};
use crate::mesh::GpuMesh;
use crate::passes::{
    AttachmentFormats, DirectionalLight, FrameContext, MeshPass, PointLightPass, RenderPass,
    RenderScene, TexturedPass,
};
use crate::ubo::GlobalUbo;

/// Maps the configured present mode to Vulkan.
pub fn present_mode_for(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Renderer construction options.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    pub validation: bool,
    pub present_mode: vk::PresentModeKHR,
    pub clear_color: [f32; 4],
    /// Directory holding the compiled `.spv` shaders.
    pub shader_dir: PathBuf,
}

impl RendererSettings {
    pub fn from_config(config: &GraphicsConfig, shader_dir: impl Into<PathBuf>) -> Self {
        Self {
            validation: config.validation,
            present_mode: present_mode_for(config.present_mode),
            clear_color: config.clear_color,
            shader_dir: shader_dir.into(),
        }
    }
}

/// Vulkan renderer.
///
/// # Resource Destruction Order
///
/// Dropping the renderer waits for the device to go idle, then destroys
/// overlays, passes, frame resources, the presentation chain, the device, the
/// surface and finally the instance. Meshes uploaded with
/// [`Renderer::upload_mesh`] must be dropped before the renderer.
pub struct Renderer {
    overlays: Vec<Box<dyn RenderPass>>,
    point_light_pass: ManuallyDrop<PointLightPass>,
    textured_pass: ManuallyDrop<TexturedPass>,
    mesh_pass: ManuallyDrop<MeshPass>,
    frames: ManuallyDrop<FrameManager>,
    driver: ManuallyDrop<FrameDriver<SwapchainTarget>>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    global_ubo: GlobalUbo,
    clear_color: [f32; 4],
}

impl Renderer {
    /// Creates the renderer for `window`.
    ///
    /// # Errors
    ///
    /// Fails if any Vulkan object cannot be created, no GPU is suitable, or a
    /// shader file is missing.
    pub fn new(window: &Window, settings: &RendererSettings) -> RendererResult<Self> {
        let extent = window.extent();
        info!("Initializing renderer ({}x{})", extent.width, extent.height);

        let extensions = window.required_extensions()?;
        let instance = Instance::new(settings.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), &surface_loader)?;
        let device = Device::new(&instance, &physical_device)?;

        let depth_format = find_depth_format(instance.handle(), device.physical_device())?;
        let target = SwapchainTarget::new(
            &instance,
            device.clone(),
            surface.handle(),
            extent,
            settings.present_mode,
            depth_format,
        )?;
        let formats = AttachmentFormats {
            color: target.format(),
            depth: depth_format,
        };

        let frames = FrameManager::new(device.clone())?;
        let shader_dir = settings.shader_dir.as_path();
        let mesh_pass = MeshPass::new(device.clone(), frames.global_layout(), formats, shader_dir)?;
        let textured_pass =
            TexturedPass::new(device.clone(), frames.global_layout(), formats, shader_dir)?;
        let point_light_pass =
            PointLightPass::new(device.clone(), frames.global_layout(), formats, shader_dir)?;

        info!("Renderer ready");

        Ok(Self {
            overlays: Vec::new(),
            point_light_pass: ManuallyDrop::new(point_light_pass),
            textured_pass: ManuallyDrop::new(textured_pass),
            mesh_pass: ManuallyDrop::new(mesh_pass),
            frames: ManuallyDrop::new(frames),
            driver: ManuallyDrop::new(FrameDriver::new(target)),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            global_ubo: GlobalUbo::default(),
            clear_color: settings.clear_color,
        })
    }

    /// Uploads a mesh and its textures for use as a scene object's mesh.
    pub fn upload_mesh(
        &self,
        data: &MeshData,
        textures: &[TextureData],
    ) -> RendererResult<Arc<GpuMesh>> {
        Ok(Arc::new(GpuMesh::upload(
            Arc::clone(&self.device),
            data,
            textures,
        )?))
    }

    /// Registers a pass that runs after the built-in passes.
    pub fn add_overlay(&mut self, overlay: Box<dyn RenderPass>) {
        debug!("Registered overlay pass '{}'", overlay.name());
        self.overlays.push(overlay);
    }

    pub fn directional_light_mut(&mut self) -> &mut DirectionalLight {
        &mut self.textured_pass.directional_light
    }

    /// Notifies the renderer of a new framebuffer size.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        self.driver.resize(extent);
    }

    /// Extent of the presentation chain.
    pub fn extent(&self) -> vk::Extent2D {
        self.driver.target().extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    pub fn wait_idle(&self) -> RendererResult<()> {
        Ok(self.device.wait_idle()?)
    }

    /// Runs all four frame steps. Returns `false` if the frame was skipped.
    pub fn draw_frame(
        &mut self,
        scene: &mut RenderScene,
        camera: &Camera,
        dt: f32,
    ) -> RendererResult<bool> {
        if !self.begin_frame()? {
            return Ok(false);
        }
        self.update(scene, camera, dt)?;
        self.render(scene, camera, dt)?;
        self.end_frame()?;
        Ok(true)
    }

    /// Waits for the current slot, acquires an image and begins recording.
    ///
    /// Returns `false` when the presentation chain is stale or the window has
    /// zero area; skip the rest of the frame in that case.
    pub fn begin_frame(&mut self) -> RendererResult<bool> {
        let Some(image_index) = self.driver.begin_frame()? else {
            return Ok(false);
        };

        if let Err(e) = self.record_frame_start(image_index) {
            return Err(self.abandon_frame(e));
        }
        Ok(true)
    }

    fn record_frame_start(&self, image_index: u32) -> RendererResult<()> {
        let cmd = self.frames.frame(self.driver.current_slot())?.command_buffer();
        cmd.begin()?;

        let target = self.driver.target();
        cmd.transition_image_layout(
            swapchain_image(target, image_index)?,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;
        cmd.transition_image_layout(
            target.depth_buffer().image(),
            vk::ImageAspectFlags::DEPTH,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        )?;
        Ok(())
    }

    /// Updates per-frame uniforms: camera, light carousel, textured pass data.
    ///
    /// Only the first [`MAX_LIGHTS`](crate::MAX_LIGHTS) point lights by id
    /// reach the shaders; a warning is logged when the scene has more.
    pub fn update(
        &mut self,
        scene: &mut RenderScene,
        camera: &Camera,
        dt: f32,
    ) -> RendererResult<()> {
        let slot = self.active_slot()?;
        self.update_uniforms(slot, scene, camera, dt)
            .map_err(|e| self.abandon_frame(e))
    }

    fn update_uniforms(
        &mut self,
        slot: usize,
        scene: &mut RenderScene,
        camera: &Camera,
        dt: f32,
    ) -> RendererResult<()> {
        self.global_ubo
            .set_camera(camera.projection(), camera.view(), camera.inverse_view());
        self.point_light_pass.update(scene, dt, &mut self.global_ubo)?;
        self.frames.frame(slot)?.write_global_ubo(&self.global_ubo)?;

        self.textured_pass.update(slot, scene)
    }

    /// Records all passes into the current frame.
    pub fn render(&mut self, scene: &RenderScene, camera: &Camera, dt: f32) -> RendererResult<()> {
        let slot = self.active_slot()?;
        let image_index = self
            .driver
            .image_index()
            .ok_or(RendererError::FrameNotStarted)?;
        self.record_passes(slot, image_index, scene, camera, dt)
            .map_err(|e| self.abandon_frame(e))
    }

    fn record_passes(
        &mut self,
        slot: usize,
        image_index: u32,
        scene: &RenderScene,
        camera: &Camera,
        dt: f32,
    ) -> RendererResult<()> {
        let frame = self.frames.frame(slot)?;
        let cmd = frame.command_buffer();
        let target = self.driver.target();
        let extent = target.extent();

        let color_view = target.swapchain().image_view(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Swapchain image view {} missing", image_index))
        })?;
        let color_attachments = [color_attachment(color_view, self.clear_color)];
        let depth = depth_attachment(target.depth_buffer().image_view());
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D::default().extent(extent))
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth);

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport_and_scissor(extent);

        let context = FrameContext {
            slot,
            frame_time: dt,
            command_buffer: cmd,
            camera,
            global_set: frame.global_set(),
            extent,
        };

        let mut passes: Vec<&mut dyn RenderPass> = vec![
            &mut *self.mesh_pass as &mut dyn RenderPass,
            &mut *self.textured_pass as &mut dyn RenderPass,
            &mut *self.point_light_pass as &mut dyn RenderPass,
        ];
        passes.extend(
            self.overlays
                .iter_mut()
                .map(|overlay| overlay.as_mut() as &mut dyn RenderPass),
        );

        let mut result = Ok(());
        for pass in passes {
            if let Err(e) = pass.record(&context, scene) {
                error!("Render pass '{}' failed: {}", pass.name(), e);
                result = Err(e);
                break;
            }
        }

        cmd.end_rendering();
        result
    }

    /// Submits and presents the frame, then advances to the next slot.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        let slot = self.active_slot()?;
        let image_index = self
            .driver
            .image_index()
            .ok_or(RendererError::FrameNotStarted)?;

        if let Err(e) = self.submit_frame(slot, image_index) {
            return Err(self.abandon_frame(e));
        }
        self.driver.end_frame()?;
        Ok(())
    }

    fn submit_frame(&self, slot: usize, image_index: u32) -> RendererResult<()> {
        let cmd = self.frames.frame(slot)?.command_buffer();
        let target = self.driver.target();
        cmd.transition_image_layout(
            swapchain_image(target, image_index)?,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        cmd.end()?;
        target.submit(slot, image_index, cmd)?;
        Ok(())
    }

    /// Closes the slot's command buffer and releases the acquired image after
    /// a failed frame step. Returns `err` for the caller to propagate.
    fn abandon_frame(&mut self, err: RendererError) -> RendererError {
        error!("Abandoning frame: {}", err);
        if let Ok(frame) = self.frames.frame(self.driver.current_slot())
            && let Err(e) = frame.command_buffer().end()
        {
            // Already ended, or never begun.
            debug!("Command buffer not closed: {}", e);
        }
        if let Err(e) = self.driver.abort_frame() {
            error!("Failed to release abandoned frame image: {}", e);
        }
        err
    }

    fn active_slot(&self) -> RendererResult<usize> {
        if !self.driver.is_frame_started() {
            return Err(RendererError::FrameNotStarted);
        }
        Ok(self.driver.current_slot())
    }
}

fn swapchain_image(target: &SwapchainTarget, image_index: u32) -> RendererResult<vk::Image> {
    target.swapchain().image(image_index).ok_or_else(|| {
        RhiError::InvalidHandle(format!("Swapchain image {} missing", image_index)).into()
    })
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }

        self.overlays.clear();
        // SAFETY: each field is dropped exactly once, here, in dependency order.
        unsafe {
            ManuallyDrop::drop(&mut self.point_light_pass);
            ManuallyDrop::drop(&mut self.textured_pass);
            ManuallyDrop::drop(&mut self.mesh_pass);
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.driver);

            if Arc::strong_count(&self.device) > 1 {
                error!(
                    "{} device references outlive the renderer",
                    Arc::strong_count(&self.device) - 1
                );
            }
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
