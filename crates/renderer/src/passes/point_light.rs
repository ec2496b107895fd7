//! Point lights: the carousel update and alpha-blended billboards.

use std::path::Path;
use std::sync::Arc;

use glam::{Quat, Vec3};
use tracing::{info, trace, warn};

use ember_rhi::descriptor::DescriptorSetLayout;
use ember_rhi::device::Device;
use ember_rhi::pipeline::{BlendMode, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use ember_scene::{ObjectId, Scene};

use super::{
    AttachmentFormats, FrameContext, PUSH_STAGES, RenderPass, RenderScene, device_push_range,
    load_shader_pair,
};
use crate::error::RendererResult;
use crate::ubo::{GlobalUbo, MAX_LIGHTS, PointLightData, PointLightPushConstants};

/// Billboard quad drawn as two triangles generated in the vertex shader.
const BILLBOARD_VERTICES: u32 = 6;

/// Rotates `position` about the world's vertical axis by `angle` radians.
///
/// The axis is -Y, matching the world up direction.
pub fn orbit_step(position: Vec3, angle: f32) -> Vec3 {
    Quat::from_axis_angle(Vec3::NEG_Y, angle) * position
}

/// Remembers the last light count reported as too many, so the warning fires
/// once per change instead of every frame.
#[derive(Debug, Default)]
struct OverflowReport {
    reported: Option<usize>,
}

impl OverflowReport {
    /// Whether a scene with `total` lights should be reported now.
    fn observe(&mut self, total: usize) -> bool {
        if total <= MAX_LIGHTS {
            self.reported = None;
            return false;
        }
        if self.reported == Some(total) {
            return false;
        }
        self.reported = Some(total);
        true
    }
}

pub struct PointLightPass {
    pipeline: Pipeline,
    layout: PipelineLayout,
    overflow: OverflowReport,
    /// Carousel speed in radians per second.
    pub orbit_speed: f32,
}

impl PointLightPass {
    pub fn new(
        device: Arc<Device>,
        global_layout: &DescriptorSetLayout,
        formats: AttachmentFormats,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let push_range = device_push_range::<PointLightPushConstants>(&device)?;
        let layout = PipelineLayout::new(device.clone(), &[global_layout.handle()], &[push_range])?;

        let (vertex_shader, fragment_shader) =
            load_shader_pair(&device, shader_dir, "point_light")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .cull_mode(CullMode::None)
            .blend_mode(BlendMode::Alpha)
            .color_attachment_format(formats.color)
            .depth_attachment_format(formats.depth)
            .build(device, &layout)?;

        info!("Point light pass ready");
        Ok(Self {
            pipeline,
            layout,
            overflow: OverflowReport::default(),
            orbit_speed: 1.0,
        })
    }

    /// Advances the light carousel by `dt` and copies the lights into `ubo`
    /// in ascending id order.
    ///
    /// Every light moves, but only the first [`MAX_LIGHTS`] by id are stored
    /// and drawn. A warning is logged whenever the excess count changes.
    pub fn update(
        &mut self,
        scene: &mut RenderScene,
        dt: f32,
        ubo: &mut GlobalUbo,
    ) -> RendererResult<()> {
        let total = update_lights(scene, dt * self.orbit_speed, ubo)?;
        if self.overflow.observe(total) {
            warn!(
                "Scene has {} point lights, only the first {} are used",
                total, MAX_LIGHTS
            );
        }
        Ok(())
    }
}

/// Orbits every light, then stores the first [`MAX_LIGHTS`] in `ubo`.
/// Returns how many lights the scene holds.
fn update_lights<M>(
    scene: &mut Scene<M>,
    angle: f32,
    ubo: &mut GlobalUbo,
) -> RendererResult<usize> {
    let mut lights = Vec::new();
    for object in scene.point_lights_mut() {
        object.transform.translation = orbit_step(object.transform.translation, angle);
        if let Some(light) = object.point_light {
            lights.push(PointLightData::new(
                object.transform.translation,
                object.color,
                light.intensity,
            ));
        }
    }
    let stored = lights.len().min(MAX_LIGHTS);
    ubo.set_point_lights(&lights[..stored])?;
    Ok(lights.len())
}

/// Lights to draw as billboards, far to near from `camera_position`.
///
/// Matches the lights [`update_lights`] stores: lights past the first
/// [`MAX_LIGHTS`] by id are left out.
fn billboard_order<M>(scene: &Scene<M>, camera_position: Vec3) -> Vec<ObjectId> {
    let mut order = scene.sort_back_to_front(camera_position);
    if let Some(first_excluded) = scene.point_lights().get(MAX_LIGHTS).map(|o| o.id()) {
        order.retain(|id| *id < first_excluded);
    }
    order
}

impl RenderPass for PointLightPass {
    fn name(&self) -> &str {
        "point_light"
    }

    fn record(&mut self, frame: &FrameContext<'_>, scene: &RenderScene) -> RendererResult<()> {
        let order = billboard_order(scene, frame.camera.position());
        if order.is_empty() {
            return Ok(());
        }

        let cmd = frame.command_buffer;
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(self.layout.handle(), 0, &[frame.global_set]);

        for id in &order {
            let Some(object) = scene.get(*id) else {
                continue;
            };
            let Some(light) = object.point_light else {
                continue;
            };
            let push = PointLightPushConstants::new(
                object.transform.translation,
                object.color,
                light.intensity,
                object.light_radius(),
            );
            cmd.push_constants(self.layout.handle(), PUSH_STAGES, &push);
            cmd.draw(BILLBOARD_VERTICES, 1);
        }

        trace!("Point light pass drew {} billboards", order.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_orbit_step_keeps_height_and_radius() {
        let start = Vec3::new(1.0, -1.0, 0.5);
        let moved = orbit_step(start, 0.7);
        assert!((moved.y - start.y).abs() < 1e-6);
        assert!((moved.length() - start.length()).abs() < 1e-5);
    }

    #[test]
    fn test_orbit_step_quarter_turn() {
        let moved = orbit_step(Vec3::X, FRAC_PI_2);
        assert!(approx_eq(moved, Vec3::Z));
    }

    #[test]
    fn test_update_fills_ubo_in_id_order() {
        let mut scene: Scene<()> = Scene::new();
        scene.create_object();
        let red = Vec3::new(1.0, 0.1, 0.1);
        let blue = Vec3::new(0.1, 0.1, 1.0);
        scene.create_point_light(0.2, 0.1, red).transform.translation = Vec3::X;
        scene.create_point_light(0.3, 0.1, blue).transform.translation = Vec3::Z;

        let mut ubo = GlobalUbo::default();
        update_lights(&mut scene, 0.0, &mut ubo).unwrap();

        assert_eq!(ubo.light_count(), 2);
        assert_eq!(ubo.point_lights[0].color, red.extend(0.2));
        assert_eq!(ubo.point_lights[1].color, blue.extend(0.3));
        assert_eq!(ubo.point_lights[0].position, Vec3::X.extend(1.0));
    }

    #[test]
    fn test_update_moves_lights() {
        let mut scene: Scene<()> = Scene::new();
        let id = {
            let light = scene.create_point_light(1.0, 0.1, Vec3::ONE);
            light.transform.translation = Vec3::X;
            light.id()
        };

        let mut ubo = GlobalUbo::default();
        update_lights(&mut scene, FRAC_PI_2, &mut ubo).unwrap();

        let moved = scene.get(id).unwrap().transform.translation;
        assert!(approx_eq(moved, Vec3::Z));
        assert!(approx_eq(ubo.point_lights[0].position.truncate(), Vec3::Z));
    }

    #[test]
    fn test_excess_lights_fill_ubo_and_keep_orbiting() {
        let mut scene: Scene<()> = Scene::new();
        let starts: Vec<Vec3> = (0..=MAX_LIGHTS)
            .map(|i| Vec3::new(1.0 + i as f32, -1.0, 0.0))
            .collect();
        let ids: Vec<_> = starts
            .iter()
            .map(|start| {
                let light = scene.create_point_light(0.2, 0.1, Vec3::ONE);
                light.transform.translation = *start;
                light.id()
            })
            .collect();

        let mut ubo = GlobalUbo::default();
        for _ in 0..3 {
            let total = update_lights(&mut scene, 0.5, &mut ubo).unwrap();
            assert_eq!(total, MAX_LIGHTS + 1);
        }

        assert_eq!(ubo.light_count(), MAX_LIGHTS);
        for (i, start) in starts.iter().enumerate() {
            let expected = (0..3).fold(*start, |p, _| orbit_step(p, 0.5));
            let actual = scene.get(ids[i]).unwrap().transform.translation;
            assert!(approx_eq(actual, expected));
            if i < MAX_LIGHTS {
                assert!(approx_eq(ubo.point_lights[i].position.truncate(), expected));
            }
        }
    }

    #[test]
    fn test_billboards_skip_lights_past_capacity() {
        let mut scene: Scene<()> = Scene::new();
        let ids: Vec<_> = (0..MAX_LIGHTS + 2)
            .map(|i| {
                let light = scene.create_point_light(1.0, 0.1, Vec3::ONE);
                light.transform.translation = Vec3::new(i as f32, 0.0, 0.0);
                light.id()
            })
            .collect();

        let order = billboard_order(&scene, Vec3::new(-10.0, 0.0, 0.0));
        assert_eq!(order.len(), MAX_LIGHTS);
        // Far to near from the camera, excess lights left out.
        let expected: Vec<_> = ids[..MAX_LIGHTS].iter().rev().copied().collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_billboards_include_all_lights_within_capacity() {
        let mut scene: Scene<()> = Scene::new();
        scene.create_object();
        for _ in 0..3 {
            scene.create_point_light(1.0, 0.1, Vec3::ONE);
        }
        assert_eq!(billboard_order(&scene, Vec3::ZERO).len(), 3);
    }

    #[test]
    fn test_overflow_reported_once_per_change() {
        let mut report = OverflowReport::default();
        assert!(!report.observe(MAX_LIGHTS));
        assert!(report.observe(MAX_LIGHTS + 1));
        assert!(!report.observe(MAX_LIGHTS + 1));
        assert!(!report.observe(MAX_LIGHTS + 1));
        assert!(report.observe(MAX_LIGHTS + 2));
        assert!(!report.observe(MAX_LIGHTS));
        assert!(report.observe(MAX_LIGHTS + 2));
    }
}
