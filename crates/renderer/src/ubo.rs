//! Uniform buffer and push constant layouts shared with the shaders.
//!
//! All structures are `#[repr(C)]` with explicit padding so that they match
//! the std140 (uniform) and std430 (push constant) blocks byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};
use tracing::warn;

use crate::error::{RendererError, RendererResult};

/// Capacity of the point light array in [`GlobalUbo`].
pub const MAX_LIGHTS: usize = 10;

/// Ambient light color; `w` is the intensity.
pub const DEFAULT_AMBIENT: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.02);

/// One point light as seen by the shaders.
///
/// - Offset 0: position (`w` unused)
/// - Offset 16: color (`w` is the intensity)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightData {
    pub position: Vec4,
    pub color: Vec4,
}

impl PointLightData {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
        }
    }
}

/// Per-frame global uniform block (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: projection matrix
/// - Offset 64: view matrix
/// - Offset 128: inverse view matrix
/// - Offset 192: ambient light color
/// - Offset 208: point lights (32 bytes each)
/// - Offset 528: light count, then 12 bytes of padding
/// - Total size: 544 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub ambient_light_color: Vec4,
    pub point_lights: [PointLightData; MAX_LIGHTS],
    pub num_lights: i32,
    pub _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: DEFAULT_AMBIENT,
            point_lights: [PointLightData::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn set_camera(&mut self, projection: Mat4, view: Mat4, inverse_view: Mat4) {
        self.projection = projection;
        self.view = view;
        self.inverse_view = inverse_view;
    }

    /// Number of lights currently stored.
    pub fn light_count(&self) -> usize {
        self.num_lights as usize
    }

    /// Replaces all lights.
    ///
    /// # Errors
    ///
    /// [`RendererError::LightOverflow`] when `lights` is longer than
    /// [`MAX_LIGHTS`]. The block is left unchanged.
    pub fn set_point_lights(&mut self, lights: &[PointLightData]) -> RendererResult<()> {
        if lights.len() > MAX_LIGHTS {
            warn!(
                "Scene has {} point lights but the global UBO holds {}",
                lights.len(),
                MAX_LIGHTS
            );
            return Err(RendererError::LightOverflow { max: MAX_LIGHTS });
        }

        self.point_lights = [PointLightData::default(); MAX_LIGHTS];
        self.point_lights[..lights.len()].copy_from_slice(lights);
        self.num_lights = lights.len() as i32;
        Ok(())
    }
}

/// Per-frame block for the textured pass (set 1, binding 0).
///
/// - Offset 0: number of bound textures
/// - Offset 4: directional light intensity
/// - Offset 16: directional light position
/// - Total size: 32 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TextureSystemUbo {
    pub texture_count: i32,
    pub directional_light_intensity: f32,
    pub _padding: [f32; 2],
    pub directional_light_position: Vec4,
}

impl TextureSystemUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// Sentinel for "no texture" in [`MeshPushConstants::texture_index`].
pub const NO_TEXTURE: i32 = -1;

/// Per-draw data for the mesh and textured passes.
///
/// - Offset 0: model matrix
/// - Offset 64: normal matrix (upper 3x3 used)
/// - Offset 128: diffuse color
/// - Offset 144: texture index into the bound array, or [`NO_TEXTURE`]
/// - Total size: 160 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub model: Mat4,
    pub normal: Mat4,
    pub diffuse_color: Vec4,
    pub texture_index: i32,
    pub _padding: [i32; 3],
}

impl MeshPushConstants {
    pub fn new(model: Mat4, normal: Mat3, diffuse_color: Vec4, texture_index: i32) -> Self {
        Self {
            model,
            normal: Mat4::from_mat3(normal),
            diffuse_color,
            texture_index,
            _padding: [0; 3],
        }
    }
}

/// Per-light data for the billboard pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightPushConstants {
    pub position: Vec4,
    pub color: Vec4,
    pub radius: f32,
    pub _padding: [f32; 3],
}

impl PointLightPushConstants {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
            radius,
            _padding: [0.0; 3],
        }
    }
}
