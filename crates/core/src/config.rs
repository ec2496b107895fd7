//! Engine configuration loaded from `ember.toml`.
//!
//! Every section is optional. Missing files and missing keys fall back to defaults.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::timer::MAX_FRAME_TIME;
use crate::Result;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "ember.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub camera: CameraConfig,
}

/// Window settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Preferred presentation mode. FIFO is used when the preference is unsupported.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

/// Graphics settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub validation: bool,
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
    pub max_frame_time: f32,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
            clear_color: [0.01, 0.01, 0.01, 1.0],
            max_frame_time: MAX_FRAME_TIME,
        }
    }
}

impl GraphicsConfig {
    fn sanitize(&mut self) {
        if !(self.max_frame_time.is_finite() && self.max_frame_time > 0.0) {
            warn!(
                "max_frame_time must be positive, got {}. Using {}.",
                self.max_frame_time, MAX_FRAME_TIME
            );
            self.max_frame_time = MAX_FRAME_TIME;
        }
    }
}

/// Camera and controller settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub move_speed: f32,
    pub look_speed: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            look_speed: 1.5,
            fov_y_degrees: 50.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl EngineConfig {
    /// Load `ember.toml` from the working directory.
    ///
    /// Parse failures are logged and the defaults are returned.
    pub fn load() -> Self {
        match Self::load_from_path(CONFIG_FILE) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load {}: {}. Using defaults.", CONFIG_FILE, e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::parse(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// A `max_frame_time` that is not a positive number is replaced by
    /// [`MAX_FRAME_TIME`].
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(contents)?;
        config.graphics.sanitize();
        Ok(config)
    }
}
