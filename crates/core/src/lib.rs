//! Core utilities shared by every Ember crate.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing with delta clamping
//! - TOML configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CameraConfig, EngineConfig, GraphicsConfig, PresentModePreference, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{MAX_FRAME_TIME, Timer, clamp_frame_time};
