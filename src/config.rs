// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Settings are read once at startup and cloned into each windowing thread.
// A missing file means defaults; a broken file is reported once logging is
// up and then ignored.

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::platform::WindowingBackend;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub backend: WindowingBackend,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Demo".to_string(),
            width: 1280,
            height: 720,
            backend: WindowingBackend::Both,
        }
    }
}

/// Background color, each component 0-255. Alpha defaults to opaque.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ClearColor {
    Rgba([u8; 4]),
    Rgb([u8; 3]),
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: ClearColor,
    /// Fraction of the swapchain extent covered by the viewport (x, y)
    pub viewport_scale: [f32; 2],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: ClearColor::Rgba([0, 0, 0, 255]),
            viewport_scale: [0.5, 1.0],
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "vulkan_demo.log".to_string(),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;

        let [sx, sy] = config.graphics.viewport_scale;
        ensure!(
            sx > 0.0 && sx <= 1.0 && sy > 0.0 && sy <= 1.0,
            "viewport_scale components must be in (0, 1], got [{}, {}]",
            sx,
            sy
        );

        Ok(config)
    }

    /// Whether validation layers should be requested. Release builds never do.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.backend, WindowingBackend::Both);
        assert_eq!(config.graphics.clear_color, ClearColor::Rgba([0, 0, 0, 255]));
        assert_eq!(config.graphics.vertex_shader, PathBuf::from("shaders/vert.spv"));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [window]
            backend = "glfw"
            width = 800

            [graphics]
            clear_color = [0, 255, 0, 255]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.backend, WindowingBackend::Glfw);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Vulkan Demo");
        assert_eq!(config.graphics.clear_color, ClearColor::Rgba([0, 255, 0, 255]));
        assert_eq!(config.graphics.present_mode, "fifo");
        assert!(config.debug.show_fps);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = Config::from_toml("[window]\nbackend = \"sdl\"\n").unwrap_err();
        assert!(format!("{:#}", err).contains("sdl"));
    }

    #[test]
    fn clear_color_accepts_rgb_triples() {
        let config = Config::from_toml("[graphics]\nclear_color = [10, 20, 30]\n").unwrap();
        assert_eq!(config.graphics.clear_color, ClearColor::Rgb([10, 20, 30]));
    }

    #[test]
    fn clear_color_needs_three_or_four_components() {
        assert!(Config::from_toml("[graphics]\nclear_color = [10, 20]\n").is_err());
    }

    #[test]
    fn out_of_range_color_component_is_rejected() {
        assert!(Config::from_toml("[graphics]\nclear_color = [0, 256, 0, 255]\n").is_err());
    }

    #[test]
    fn present_mode_names_map_to_vulkan() {
        let mut config = Config::default();
        for (name, mode) in [
            ("immediate", vk::PresentModeKHR::IMMEDIATE),
            ("Mailbox", vk::PresentModeKHR::MAILBOX),
            ("FIFO", vk::PresentModeKHR::FIFO),
            ("fifo_relaxed", vk::PresentModeKHR::FIFO_RELAXED),
            ("vsync-ish", vk::PresentModeKHR::FIFO),
        ] {
            config.graphics.present_mode = name.to_string();
            assert_eq!(config.present_mode(), mode, "{name}");
        }
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from_path("definitely/not/here/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn viewport_scale_must_be_positive_and_at_most_one() {
        assert!(Config::from_toml("[graphics]\nviewport_scale = [1.0, 0.25]\n").is_ok());
        assert!(Config::from_toml("[graphics]\nviewport_scale = [0.0, 1.0]\n").is_err());
        assert!(Config::from_toml("[graphics]\nviewport_scale = [0.5, -1.0]\n").is_err());
        let err = Config::from_toml("[graphics]\nviewport_scale = [1.5, 1.0]\n").unwrap_err();
        assert!(err.to_string().contains("viewport_scale"));
    }

    #[test]
    fn malformed_file_error_names_the_path() {
        let path = std::env::temp_dir().join(format!("vulkan_demo_bad_{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = \"wide\"\n").unwrap();

        let result = Config::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("vulkan_demo_bad_"));
    }
}
