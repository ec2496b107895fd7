//! Keyboard and mouse movement for a viewer transform.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};

use crate::camera::WORLD_UP;
use crate::transform::TransformComponent;

/// Pitch limit in radians, roughly 85 degrees.
pub const PITCH_LIMIT: f32 = 1.5;

/// Movement actions the controller polls for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MoveAction {
    MoveLeft,
    MoveRight,
    MoveForward,
    MoveBackward,
    MoveUp,
    MoveDown,
    LookLeft,
    LookRight,
    LookUp,
    LookDown,
}

/// Source of input state, polled once per frame.
pub trait MovementInput {
    fn is_active(&self, action: MoveAction) -> bool;

    /// Cursor movement in pixels while mouse-look is held, `None` otherwise.
    fn look_delta(&self) -> Option<Vec2> {
        None
    }
}

/// Flies a transform in the XZ plane with keyboard look and optional mouse look.
#[derive(Clone, Copy, Debug)]
pub struct KeyboardMovementController {
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for KeyboardMovementController {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl KeyboardMovementController {
    pub fn new(move_speed: f32, look_speed: f32) -> Self {
        Self {
            move_speed,
            look_speed,
        }
    }

    /// Applies one frame of input to `transform`.
    ///
    /// Look input is normalized so diagonal rotation is not faster. Pitch is
    /// clamped to [`PITCH_LIMIT`] and yaw wrapped into `0..TAU`.
    pub fn move_in_plane_xz(
        &self,
        input: &impl MovementInput,
        dt: f32,
        transform: &mut TransformComponent,
    ) {
        let axis = |positive: MoveAction, negative: MoveAction| -> f32 {
            input.is_active(positive) as i32 as f32 - input.is_active(negative) as i32 as f32
        };

        let mut rotate = Vec3::new(
            axis(MoveAction::LookUp, MoveAction::LookDown),
            axis(MoveAction::LookRight, MoveAction::LookLeft),
            0.0,
        );
        if let Some(delta) = input.look_delta() {
            rotate.x -= delta.y;
            rotate.y += delta.x;
        }

        if rotate.length_squared() > f32::EPSILON {
            transform.rotation += self.look_speed * dt * rotate.normalize();
        }

        transform.rotation.x = transform.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);

        let move_dir = forward * axis(MoveAction::MoveForward, MoveAction::MoveBackward)
            + right * axis(MoveAction::MoveRight, MoveAction::MoveLeft)
            + WORLD_UP * axis(MoveAction::MoveUp, MoveAction::MoveDown);

        if move_dir.length_squared() > f32::EPSILON {
            transform.translation += self.move_speed * dt * move_dir.normalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeInput {
        active: HashSet<MoveAction>,
        look: Option<Vec2>,
    }

    impl FakeInput {
        fn with(actions: &[MoveAction]) -> Self {
            Self {
                active: actions.iter().copied().collect(),
                look: None,
            }
        }
    }

    impl MovementInput for FakeInput {
        fn is_active(&self, action: MoveAction) -> bool {
            self.active.contains(&action)
        }

        fn look_delta(&self) -> Option<Vec2> {
            self.look
        }
    }

    #[test]
    fn test_forward_moves_along_z_at_zero_yaw() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        controller.move_in_plane_xz(
            &FakeInput::with(&[MoveAction::MoveForward]),
            1.0,
            &mut transform,
        );
        assert!((transform.translation - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_diagonal_move_is_normalized() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        controller.move_in_plane_xz(
            &FakeInput::with(&[MoveAction::MoveForward, MoveAction::MoveRight]),
            0.5,
            &mut transform,
        );
        assert!((transform.translation.length() - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_up_is_negative_y() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        controller.move_in_plane_xz(&FakeInput::with(&[MoveAction::MoveUp]), 1.0, &mut transform);
        assert!(transform.translation.y < 0.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        let input = FakeInput::with(&[MoveAction::LookUp]);
        for _ in 0..100 {
            controller.move_in_plane_xz(&input, 0.1, &mut transform);
        }
        assert_eq!(transform.rotation.x, PITCH_LIMIT);
    }

    #[test]
    fn test_yaw_wraps() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        let input = FakeInput::with(&[MoveAction::LookLeft]);
        controller.move_in_plane_xz(&input, 0.1, &mut transform);
        assert!(transform.rotation.y >= 0.0 && transform.rotation.y < TAU);
        assert!((transform.rotation.y - (TAU - 0.15)).abs() < 1e-4);
    }

    #[test]
    fn test_mouse_look_rotates_yaw() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::default();
        let input = FakeInput {
            look: Some(Vec2::new(40.0, 0.0)),
            ..Default::default()
        };
        controller.move_in_plane_xz(&input, 0.2, &mut transform);
        assert!((transform.rotation.y - 0.3).abs() < 1e-5);
        assert_eq!(transform.rotation.x, 0.0);
    }

    #[test]
    fn test_no_input_leaves_transform() {
        let controller = KeyboardMovementController::default();
        let mut transform = TransformComponent::new(Vec3::new(1.0, 2.0, 3.0));
        controller.move_in_plane_xz(&FakeInput::default(), 1.0, &mut transform);
        assert_eq!(transform.translation, Vec3::new(1.0, 2.0, 3.0));
    }
}
