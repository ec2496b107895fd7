//! Keyboard and mouse state, polled by the movement controller.

use std::collections::HashSet;

use ember_scene::{MoveAction, MovementInput};
use glam::Vec2;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Button that enables mouse-look while held.
pub const LOOK_BUTTON: MouseButton = MouseButton::Right;

/// Key bound to each movement action.
pub fn key_for(action: MoveAction) -> KeyCode {
    match action {
        MoveAction::MoveLeft => KeyCode::KeyA,
        MoveAction::MoveRight => KeyCode::KeyD,
        MoveAction::MoveForward => KeyCode::KeyW,
        MoveAction::MoveBackward => KeyCode::KeyS,
        MoveAction::MoveUp => KeyCode::KeyE,
        MoveAction::MoveDown => KeyCode::KeyQ,
        MoveAction::LookLeft => KeyCode::ArrowLeft,
        MoveAction::LookRight => KeyCode::ArrowRight,
        MoveAction::LookUp => KeyCode::ArrowUp,
        MoveAction::LookDown => KeyCode::ArrowDown,
    }
}

/// Tracks the current state of keyboard and mouse input.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,

    /// Last cursor position, `None` until the first move event.
    mouse_position: Option<Vec2>,
    /// Cursor movement accumulated since the last `begin_frame`.
    mouse_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state. Call once per frame after the controller ran.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = Vec2::ZERO;
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        self.pressed_buttons.insert(button);
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Handle cursor movement. Several events per frame add up.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// Forget the cursor position, e.g. when it leaves the window.
    pub fn on_cursor_left(&mut self) {
        self.mouse_position = None;
    }

    /// Drops all held keys and buttons, e.g. on focus loss.
    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.pressed_buttons.clear();
        self.mouse_position = None;
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }
}

impl MovementInput for InputState {
    fn is_active(&self, action: MoveAction) -> bool {
        self.is_key_pressed(key_for(action))
    }

    fn look_delta(&self) -> Option<Vec2> {
        (self.is_mouse_pressed(LOOK_BUTTON) && self.mouse_delta != Vec2::ZERO)
            .then_some(self.mouse_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.begin_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));

        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_movement_bindings() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyE);
        input.on_key_pressed(KeyCode::ArrowLeft);

        assert!(input.is_active(MoveAction::MoveUp));
        assert!(input.is_active(MoveAction::LookLeft));
        assert!(!input.is_active(MoveAction::MoveDown));
        assert!(!input.is_active(MoveAction::MoveForward));
    }

    #[test]
    fn test_mouse_delta_accumulates() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.on_mouse_moved(13.0, 9.0);
        input.on_mouse_moved(15.0, 12.0);
        assert_eq!(input.mouse_delta(), Vec2::new(5.0, 2.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn test_look_delta_requires_button() {
        let mut input = InputState::new();
        input.on_mouse_moved(0.0, 0.0);
        input.on_mouse_moved(4.0, -2.0);
        assert_eq!(input.look_delta(), None);

        input.on_mouse_pressed(MouseButton::Right);
        assert_eq!(input.look_delta(), Some(Vec2::new(4.0, -2.0)));
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.on_mouse_pressed(MouseButton::Right);
        input.release_all();
        assert!(!input.is_active(MoveAction::MoveLeft));
        assert!(!input.is_mouse_pressed(MouseButton::Right));
    }
}
