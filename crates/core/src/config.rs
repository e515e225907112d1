//! Engine configuration loaded from a TOML file.
//!
//! Every field has a default so a partial (or missing) file is valid:
//!
//! ```toml
//! validation = false
//! shadow_map_resolution = [2048, 2048]
//! present_mode = "mailbox"
//!
//! [window]
//! width = 1920
//! height = 1080
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::Result;

/// Presentation mode requested for the swapchain.
///
/// The swapchain falls back to `Fifo` when the surface does not support the
/// requested mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    FifoRelaxed,
    Mailbox,
    Immediate,
}

/// Initial window parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Vulkan Renderer".to_string(),
        }
    }
}

/// Recognized engine options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of frames the CPU may record ahead of the GPU.
    pub max_frames_in_flight: usize,
    /// Shadow map width and height in texels.
    pub shadow_map_resolution: [u32; 2],
    pub shadow_near: f32,
    pub shadow_far: f32,
    /// Zoom factor applied to directional light orthographic bounds.
    pub directional_light_distance: f32,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    pub present_mode: PresentModeConfig,
    /// Overrides asset discovery when set.
    pub resource_root: Option<PathBuf>,
    pub window: WindowConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            shadow_map_resolution: [4096, 4096],
            shadow_near: 0.1,
            shadow_far: 120.0,
            directional_light_distance: 100.0,
            validation: cfg!(debug_assertions),
            present_mode: PresentModeConfig::Fifo,
            resource_root: None,
            window: WindowConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load the configuration at `path`.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)?;
                info!("Loaded config from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.max_frames_in_flight, 2);
        assert_eq!(config.shadow_map_resolution, [4096, 4096]);
        assert_eq!(config.shadow_near, 0.1);
        assert_eq!(config.shadow_far, 120.0);
        assert_eq!(config.directional_light_distance, 100.0);
        assert_eq!(config.present_mode, PresentModeConfig::Fifo);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            validation = false
            shadow_map_resolution = [2048, 1024]
            present_mode = "mailbox"

            [window]
            width = 800
            "#,
        )
        .unwrap();

        assert!(!config.validation);
        assert_eq!(config.shadow_map_resolution, [2048, 1024]);
        assert_eq!(config.present_mode, PresentModeConfig::Mailbox);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.shadow_far, 120.0);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(EngineConfig::from_toml("shadow_near = \"close\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("renderer_core_no_such_config.toml");
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.max_frames_in_flight, 2);
    }
}
