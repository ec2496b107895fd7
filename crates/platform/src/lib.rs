//! Platform layer for the Ember engine.
//!
//! - Window management via winit
//! - Vulkan surface creation through raw window handles
//! - Keyboard and mouse state feeding the movement controller

mod input;
mod window;

pub use input::{InputState, KeyCode, LOOK_BUTTON, MouseButton, key_for};
pub use window::{Surface, Window, extent_from_size};

pub use winit::application::ApplicationHandler;
pub use winit::event::{ElementState, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
