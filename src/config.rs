// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::{ContextSettings, ValidationSettings};

const CONFIG_PATH: &str = "config.toml";

/// Where the active configuration came from
#[derive(Debug)]
pub enum ConfigOrigin {
    File(PathBuf),
    Missing(PathBuf),
    /// The file exists but could not be used; defaults are active
    Invalid(anyhow::Error),
}

impl ConfigOrigin {
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigOrigin::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigOrigin::Invalid(e) => {
                log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e)
            }
        }
    }
}

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub application: ApplicationConfig,
    pub debug: DebugConfig,
    pub shaders: ShaderConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Names reported to the driver in VkApplicationInfo
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
    pub engine_name: String,
    pub exit_after_init: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Vulkan Triangle".to_string(),
            engine_name: "No Engine".to_string(),
            exit_after_init: false,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub layers: Vec<String>,
    pub message_severity: String,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
            message_severity: "verbose".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where the compiled SPIR-V lives
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub directory: PathBuf,
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            vertex: "triangle.vert.spv".to_string(),
            fragment: "triangle.frag.spv".to_string(),
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> (Self, ConfigOrigin) {
        Self::load_from_path(CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// Nothing is logged here; the caller reports the origin once logging
    /// is up, since the log level itself comes from this file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> (Self, ConfigOrigin) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigOrigin::Missing(path.to_path_buf()));
        }

        match Self::read(path) {
            Ok(config) => (config, ConfigOrigin::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigOrigin::Invalid(e)),
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the debug messenger severities as a Vulkan flag set.
    ///
    /// "verbose" is VERBOSE | WARNING | ERROR; only "info" turns on INFO.
    pub fn get_message_severity(&self) -> vk::DebugUtilsMessageSeverityFlagsEXT {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        let error = Severity::ERROR;
        let warning = error | Severity::WARNING;
        let info = warning | Severity::INFO;
        let verbose = warning | Severity::VERBOSE;

        match self.debug.message_severity.to_lowercase().as_str() {
            "verbose" => verbose,
            "info" => info,
            "warning" => warning,
            "error" => error,
            _ => {
                log::warn!(
                    "Unknown message severity '{}', defaulting to verbose",
                    self.debug.message_severity
                );
                verbose
            }
        }
    }

    /// Get the default log filter; RUST_LOG still takes precedence
    pub fn get_log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }

    /// Validation only runs in debug builds, and only when the config asks for it
    pub fn validation_settings(&self) -> ValidationSettings {
        if cfg!(debug_assertions) && self.debug.validation_layers {
            ValidationSettings::new(true, self.debug.layers.clone())
        } else {
            ValidationSettings::disabled()
        }
    }

    /// Everything the Vulkan context needs, resolved from this config
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            application_name: self.application.name.clone(),
            engine_name: self.application.engine_name.clone(),
            validation: self.validation_settings(),
            message_severity: self.get_message_severity(),
            vertex_shader: self.shaders.vertex.clone(),
            fragment_shader: self.shaders.fragment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.debug.layers, vec!["VK_LAYER_KHRONOS_validation"]);
        assert_eq!(config.shaders.vertex, "triangle.vert.spv");
        assert!(!config.application.exit_after_init);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            width = 800

            [debug]
            message_severity = "warning"
            log_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.window.title, "Vulkan Triangle");
        assert_eq!(config.get_log_level(), log::LevelFilter::Debug);

        let severity = config.get_message_severity();
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(!severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
    }

    #[test]
    fn unknown_severity_falls_back_to_verbose() {
        let config = Config::parse("[debug]\nmessage_severity = \"chatty\"").unwrap();
        assert!(config
            .get_message_severity()
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
    }

    #[test]
    fn validation_disabled_in_config_is_never_enabled() {
        let config = Config::parse("[debug]\nvalidation_layers = false").unwrap();
        let validation = config.validation_settings();

        assert!(!validation.enabled());
        assert!(validation.layer_names().unwrap().is_empty());
    }

    #[test]
    fn verbose_preset_matches_verbose_warning_error() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        let config = Config::default();
        assert_eq!(
            config.get_message_severity(),
            Severity::VERBOSE | Severity::WARNING | Severity::ERROR
        );
    }

    #[test]
    fn info_preset_adds_info_without_verbose() {
        let config = Config::parse("[debug]\nmessage_severity = \"info\"").unwrap();
        let severity = config.get_message_severity();

        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(!severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hello-triangle-{}-{}", std::process::id(), name))
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = scratch_path("absent.toml");
        let (config, origin) = Config::load_from_path(&path);

        assert_eq!(config.window.width, 1280);
        assert!(matches!(origin, ConfigOrigin::Missing(p) if p == path));
    }

    #[test]
    fn broken_file_falls_back_with_the_error_kept() {
        let path = scratch_path("broken.toml");
        std::fs::write(&path, "[window\nwidth = ").unwrap();

        let (config, origin) = Config::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1280);
        match origin {
            ConfigOrigin::Invalid(e) => {
                assert!(format!("{:#}", e).contains("Failed to parse config file"))
            }
            other => panic!("unexpected origin: {:?}", other),
        }
    }

    #[test]
    fn readable_file_is_used() {
        let path = scratch_path("good.toml");
        std::fs::write(&path, "[window]\nheight = 480").unwrap();

        let (config, origin) = Config::load_from_path(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.height, 480);
        assert!(matches!(origin, ConfigOrigin::File(_)));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
    }
}
