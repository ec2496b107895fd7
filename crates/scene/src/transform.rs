//! Transform component for scene objects.
//!
//! Rotation is stored as Tait-Bryan angles applied in Y, X, Z order. The
//! model matrix is `translate * Ry * Rx * Rz * scale`, built directly from the
//! angles rather than by multiplying five matrices.
//!
//! # Example
//!
//! ```
//! use ember_scene::TransformComponent;
//! use glam::Vec3;
//!
//! let transform = TransformComponent {
//!     translation: Vec3::new(1.0, 0.0, 0.0),
//!     ..Default::default()
//! };
//! let world = transform.matrix().transform_point3(Vec3::ZERO);
//! assert_eq!(world, Vec3::new(1.0, 0.0, 0.0));
//! ```

use glam::{Mat3, Mat4, Vec3, Vec4};

/// Translation, scale and YXZ Euler rotation (radians).
///
/// Matrices are recomputed on every call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformComponent {
    pub translation: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

/// Columns of `Ry * Rx * Rz` for the given YXZ angles.
pub(crate) fn rotation_basis_yxz(rotation: Vec3) -> [Vec3; 3] {
    let (s3, c3) = rotation.z.sin_cos();
    let (s2, c2) = rotation.x.sin_cos();
    let (s1, c1) = rotation.y.sin_cos();

    [
        Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1),
        Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3),
        Vec3::new(c2 * s1, -s2, c1 * c2),
    ]
}

impl TransformComponent {
    pub fn new(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Model matrix: `T * Ry * Rx * Rz * S`.
    pub fn matrix(&self) -> Mat4 {
        let [x, y, z] = rotation_basis_yxz(self.rotation);
        Mat4::from_cols(
            (x * self.scale.x).extend(0.0),
            (y * self.scale.y).extend(0.0),
            (z * self.scale.z).extend(0.0),
            Vec4::new(self.translation.x, self.translation.y, self.translation.z, 1.0),
        )
    }

    /// Normal matrix: the rotation with inverse scale, no translation.
    ///
    /// Equals the inverse transpose of the upper 3x3 of [`Self::matrix`]. A zero
    /// scale component yields non-finite entries.
    pub fn normal_matrix(&self) -> Mat3 {
        let [x, y, z] = rotation_basis_yxz(self.rotation);
        let inv_scale = self.scale.recip();
        Mat3::from_cols(x * inv_scale.x, y * inv_scale.y, z * inv_scale.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = TransformComponent::default();
        assert_eq!(t.translation, Vec3::ZERO);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert_eq!(t.normal_matrix(), Mat3::IDENTITY);
    }

    #[test]
    fn test_matrix_matches_composed_product() {
        let t = TransformComponent {
            translation: Vec3::new(1.0, -2.0, 3.0),
            scale: Vec3::new(2.0, 0.5, 1.5),
            rotation: Vec3::new(0.3, 1.1, -0.7),
        };

        let expected = Mat4::from_translation(t.translation)
            * Mat4::from_rotation_y(t.rotation.y)
            * Mat4::from_rotation_x(t.rotation.x)
            * Mat4::from_rotation_z(t.rotation.z)
            * Mat4::from_scale(t.scale);

        let actual = t.matrix();
        for i in 0..4 {
            assert!((actual.col(i) - expected.col(i)).abs().max_element() < EPSILON);
        }
    }

    #[test]
    fn test_normal_matrix_is_inverse_transpose() {
        let t = TransformComponent {
            translation: Vec3::new(5.0, 0.0, 0.0),
            scale: Vec3::new(1.0, 2.0, 4.0),
            rotation: Vec3::new(0.2, -0.4, 0.9),
        };

        let expected = Mat3::from_mat4(t.matrix()).inverse().transpose();
        let actual = t.normal_matrix();
        for i in 0..3 {
            assert!(approx_eq_vec3(actual.col(i), expected.col(i)));
        }
    }

    #[test]
    fn test_yaw_rotates_forward_axis() {
        let t = TransformComponent {
            rotation: Vec3::new(0.0, FRAC_PI_2, 0.0),
            ..Default::default()
        };
        let forward = t.matrix().transform_vector3(Vec3::Z);
        assert!(approx_eq_vec3(forward, Vec3::X));
    }
}
