//! Camera projection and view matrices.
//!
//! Conventions: left-handed view space looking down +Z, depth in `0..1`, and
//! world "up" along -Y so clip-space Y points down as Vulkan expects. No
//! projection flip is needed.

use glam::{Mat4, Vec3, Vec4};

use crate::transform::rotation_basis_yxz;

/// World up direction.
pub const WORLD_UP: Vec3 = Vec3::NEG_Y;

/// Camera holding projection, view and inverse view matrices.
#[derive(Clone, Debug)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orthographic volume bounded by six planes. `top` maps to clip -1.
    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        // glam's bottom/top are swapped so +Y stays down.
        self.projection = Mat4::orthographic_lh(left, right, top, bottom, near, far);
    }

    /// Perspective projection. `fov_y` is in radians.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        debug_assert!(aspect.abs() > f32::EPSILON, "aspect ratio must be non-zero");
        self.projection = Mat4::perspective_lh(fov_y, aspect, near, far);
    }

    /// Looks from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_basis(position, u, v, w);
    }

    /// Looks from `position` towards `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// Orients the camera by YXZ Euler angles, matching [`crate::TransformComponent`].
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let [u, v, w] = rotation_basis_yxz(rotation);
        self.set_basis(position, u, v, w);
    }

    fn set_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// World-space camera position, taken from the inverse view.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn assert_mat_eq(a: Mat4, b: Mat4) {
        for i in 0..4 {
            assert!(
                (a.col(i) - b.col(i)).abs().max_element() < EPSILON,
                "column {} differs: {:?} vs {:?}",
                i,
                a.col(i),
                b.col(i)
            );
        }
    }

    #[test]
    fn test_view_and_inverse_are_inverses() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(1.0, -2.0, -5.0), Vec3::new(0.3, 0.8, 0.1));
        assert_mat_eq(camera.view() * camera.inverse_view(), Mat4::IDENTITY);
    }

    #[test]
    fn test_position_from_inverse_view() {
        let mut camera = Camera::new();
        let position = Vec3::new(0.0, -1.0, -2.5);
        camera.set_view_yxz(position, Vec3::new(0.0, 1.2, 0.0));
        assert!((camera.position() - position).length() < EPSILON);
    }

    #[test]
    fn test_view_target_puts_target_on_positive_z() {
        let mut camera = Camera::new();
        camera.set_view_target(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO, WORLD_UP);
        let in_view = camera.view().transform_point3(Vec3::ZERO);
        assert!(in_view.x.abs() < EPSILON);
        assert!(in_view.y.abs() < EPSILON);
        assert!((in_view.z - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_perspective_depth_range() {
        let mut camera = Camera::new();
        camera.set_perspective(50f32.to_radians(), 1.5, 0.1, 100.0);

        let near = camera.projection() * Vec4::new(0.0, 0.0, 0.1, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, 100.0, 1.0);
        assert!((near.z / near.w).abs() < EPSILON);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_orthographic_keeps_y_down() {
        let mut camera = Camera::new();
        camera.set_orthographic(-1.0, 1.0, -1.0, 1.0, 0.0, 10.0);

        let top = camera.projection() * Vec4::new(0.0, -1.0, 5.0, 1.0);
        let right = camera.projection() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((top.y + 1.0).abs() < EPSILON);
        assert!((right.x - 1.0).abs() < EPSILON);
        assert!(right.z.abs() < EPSILON);
    }
}
