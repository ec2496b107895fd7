//! Ember demo: a cube on a textured floor, lit by a carousel of point lights.
//!
//! Controls: WASD/QE to move, arrow keys or right mouse drag to look,
//! Escape to quit.

use std::f32::consts::TAU;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{error, info, warn};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ember_core::{EngineConfig, Timer, init_logging};
use ember_platform::{
    ActiveEventLoop, ApplicationHandler, ControlFlow, EventLoop, InputState, Window, WindowEvent,
};
use ember_renderer::passes::orbit_step;
use ember_renderer::{RenderScene, Renderer, RendererSettings};
use ember_resources::{MeshData, TextureData};
use ember_scene::{Camera, KeyboardMovementController, Scene, TransformComponent};

const SHADER_DIR: &str = "shaders";
const FLOOR_TEXTURE: &str = "textures/floor.png";

const LIGHT_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.1, 0.1),
    Vec3::new(0.1, 0.1, 1.0),
    Vec3::new(0.1, 1.0, 0.1),
    Vec3::new(1.0, 1.0, 0.1),
    Vec3::new(0.1, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];
const LIGHT_INTENSITY: f32 = 0.2;
const LIGHT_RADIUS: f32 = 0.1;

// Field order is drop order: scene meshes go before the renderer, the
// renderer before the window.
struct App {
    config: EngineConfig,
    scene: RenderScene,
    camera: Camera,
    viewer: TransformComponent,
    controller: KeyboardMovementController,
    input: InputState,
    timer: Timer,
    renderer: Option<Renderer>,
    window: Option<Window>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        let controller =
            KeyboardMovementController::new(config.camera.move_speed, config.camera.look_speed);
        let timer = Timer::with_max_delta(config.graphics.max_frame_time);
        let mut viewer = TransformComponent::default();
        viewer.translation.z = -2.5;

        Self {
            config,
            scene: Scene::new(),
            camera: Camera::new(),
            viewer,
            controller,
            input: InputState::new(),
            timer,
            renderer: None,
            window: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window =
            Window::new(event_loop, &self.config.window).context("Failed to create window")?;
        let settings = RendererSettings::from_config(&self.config.graphics, SHADER_DIR);
        let renderer =
            Renderer::new(&window, &settings).context("Failed to initialize renderer")?;

        populate_scene(&mut self.scene, &renderer).context("Failed to build scene")?;
        info!(
            "Scene ready: {} objects, {} point lights",
            self.scene.len(),
            self.scene.point_lights().len()
        );

        window.request_redraw();
        self.timer.reset();
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };

        let dt = self.timer.delta_secs();

        if window.was_resized() {
            renderer.resize(window.extent());
            window.reset_resized();
        }

        self.controller
            .move_in_plane_xz(&self.input, dt, &mut self.viewer);
        self.camera
            .set_view_yxz(self.viewer.translation, self.viewer.rotation);
        let camera_config = &self.config.camera;
        self.camera.set_perspective(
            camera_config.fov_y_degrees.to_radians(),
            renderer.aspect_ratio(),
            camera_config.near,
            camera_config.far,
        );

        renderer
            .draw_frame(&mut self.scene, &self.camera, dt)
            .context("Failed to draw frame")?;

        self.input.begin_frame();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{:#}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = &self.renderer
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to wait for device idle: {}", e);
        }
        self.scene = Scene::new();
        self.renderer = None;
        self.window = None;
    }
}

fn populate_scene(scene: &mut RenderScene, renderer: &Renderer) -> Result<()> {
    let cube = renderer.upload_mesh(&MeshData::cube(), &[])?;
    let object = scene.create_object();
    object.mesh = Some(cube);
    object.transform.translation = Vec3::new(0.0, 0.25, 0.0);
    object.transform.scale = Vec3::splat(0.5);

    let floor = renderer.upload_mesh(&MeshData::quad(), &[floor_texture()?])?;
    let object = scene.create_object();
    object.mesh = Some(floor);
    object.transform.translation = Vec3::new(0.0, 0.5, 0.0);
    object.transform.scale = Vec3::new(3.0, 1.0, 3.0);

    for (i, color) in LIGHT_COLORS.iter().enumerate() {
        let angle = i as f32 * TAU / LIGHT_COLORS.len() as f32;
        let light = scene.create_point_light(LIGHT_INTENSITY, LIGHT_RADIUS, *color);
        light.transform.translation = orbit_step(Vec3::new(-1.0, -1.0, -1.0), angle);
    }
    Ok(())
}

fn floor_texture() -> Result<TextureData> {
    if Path::new(FLOOR_TEXTURE).exists() {
        return TextureData::from_file(FLOOR_TEXTURE)
            .with_context(|| format!("Failed to load {}", FLOOR_TEXTURE));
    }
    warn!("{} not found, using a plain floor", FLOOR_TEXTURE);
    Ok(TextureData::solid(1, 1, [180, 180, 180, 255])?)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &mut self.window {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        if key == KeyCode::Escape {
                            event_loop.exit();
                        }
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => self.input.on_cursor_left(),
            WindowEvent::Focused(false) => self.input.release_all(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    init_logging();
    info!("Starting Ember");

    let config = EngineConfig::load();
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.error.take() {
        Some(e) => Err(e),
        None => {
            info!("Ember exited cleanly");
            Ok(())
        }
    }
}
