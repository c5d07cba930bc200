//! # Application Configuration
//!
//! All tunables for the water demo live here: window, renderer, shader paths
//! and scene assets. Everything is serde-serializable so a `config/water.toml`
//! (or `.ron`) can override the defaults.
//!
//! ## Sections
//!
//! - **Engine**: log filter and debug toggles
//! - **Window**: title and initial framebuffer size
//! - **Renderer**: frames in flight, validation layers, SPIR-V shader paths
//! - **Scene**: model/texture paths, water plane height, simulation grid size

use serde::{Serialize, Deserialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

const SHADER_DIRS: [&str; 4] = ["target/shaders/", "shaders/", "resources/shaders/", "../target/shaders/"];

/// Resolve a compiled shader name against the usual output directories
fn resolve_shader(name: &str) -> String {
    SHADER_DIRS
        .iter()
        .map(|dir| format!("{dir}{name}"))
        .find(|candidate| Path::new(candidate).exists())
        .unwrap_or_else(|| format!("target/shaders/{name}"))
}

/// # Shader Configuration
///
/// SPIR-V paths for every program the frame uses. The build script writes
/// `<program>_<stage>.spv`, which is what the defaults look for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShaderConfig {
    /// Textured object vertex stage (chalet, lake bed)
    pub object_vertex: String,
    /// Textured object fragment stage
    pub object_fragment: String,
    /// Skybox vertex stage
    pub skybox_vertex: String,
    /// Skybox fragment stage
    pub skybox_fragment: String,
    /// Water surface vertex stage
    pub water_vertex: String,
    /// Water surface fragment stage
    pub water_fragment: String,
    /// Height-field simulation compute stage
    pub simulation_compute: String,
}

impl ShaderConfig {
    /// All paths in a fixed order, used for validation
    pub fn all_paths(&self) -> [&str; 7] {
        [
            &self.object_vertex,
            &self.object_fragment,
            &self.skybox_vertex,
            &self.skybox_fragment,
            &self.water_vertex,
            &self.water_fragment,
            &self.simulation_compute,
        ]
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        match self.all_paths().into_iter().find(|p| !Path::new(p).exists()) {
            Some(missing) => Err(format!("Shader not found: {missing}")),
            None => Ok(()),
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            object_vertex: resolve_shader("object_vert.spv"),
            object_fragment: resolve_shader("object_frag.spv"),
            skybox_vertex: resolve_shader("skybox_vert.spv"),
            skybox_fragment: resolve_shader("skybox_frag.spv"),
            water_vertex: resolve_shader("water_vert.spv"),
            water_fragment: resolve_shader("water_frag.spv"),
            simulation_compute: resolve_shader("simulation_comp.spv"),
        }
    }
}

/// # Vulkan Renderer Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VulkanRendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Frames the host may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Shader configuration
    pub shaders: ShaderConfig,
}

impl VulkanRendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            max_frames_in_flight: 2,
            enable_validation: None,
            shaders: ShaderConfig::default(),
        }
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Validation layers are on in debug builds unless overridden
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.max_frames_in_flight == 0 {
            return Err("Max frames in flight must be at least 1".to_string());
        }
        if self.max_frames_in_flight > 8 {
            return Err("Max frames in flight should not exceed 8".to_string());
        }
        self.shaders.validate()
    }
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self::new("Water Demo")
    }
}

/// # Engine Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default `env_logger` filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to enable debug features
    pub debug_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            debug_mode: cfg!(debug_assertions),
        }
    }
}

/// # Window Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    /// Base window title; the FPS counter is appended at runtime
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Water".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// # Scene Configuration
///
/// Asset locations and the two numbers that shape the water: the height of
/// the water plane (reflection mirror and clip planes) and the simulation grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneConfig {
    /// Directory holding `posx.jpg` .. `negz.jpg`
    pub skybox_dir: String,
    /// Cube model used for the skybox
    pub skybox_model: String,
    /// Chalet model
    pub chalet_model: String,
    /// Chalet texture
    pub chalet_texture: String,
    /// Lake bed model
    pub lake_model: String,
    /// Lake bed texture
    pub lake_texture: String,
    /// Optional heightmap used to seed the simulation
    pub heightmap: Option<String>,
    /// World-space height of the water plane
    pub water_height: f32,
    /// Half extent of the water quad in world units
    pub water_half_size: f32,
    /// Simulation grid (width, height) in texels; multiples of 32
    pub simulation_extent: (u32, u32),
    /// Refraction/reflection capture size; `None` follows the swapchain
    pub capture_size: Option<(u32, u32)>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            skybox_dir: "resources/textures/skybox".to_string(),
            skybox_model: "resources/models/cube.obj".to_string(),
            chalet_model: "resources/models/chalet.obj".to_string(),
            chalet_texture: "resources/textures/chalet.jpg".to_string(),
            lake_model: "resources/models/lake.obj".to_string(),
            lake_texture: "resources/textures/lake.png".to_string(),
            heightmap: None,
            water_height: 0.0,
            water_half_size: 10.0,
            simulation_extent: (512, 512),
            capture_size: None,
        }
    }
}

impl SceneConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let (w, h) = self.simulation_extent;
        if w == 0 || h == 0 || w % 32 != 0 || h % 32 != 0 {
            return Err(format!("Simulation extent {w}x{h} must be a non-zero multiple of 32"));
        }
        if matches!(self.capture_size, Some((0, _)) | Some((_, 0))) {
            return Err("Capture size must be non-zero".to_string());
        }
        if self.water_half_size <= 0.0 {
            return Err("Water half size must be positive".to_string());
        }
        Ok(())
    }
}

/// # Complete Application Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ApplicationConfig {
    /// Engine core configuration
    pub engine: EngineConfig,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering system configuration
    pub renderer: VulkanRendererConfig,
    /// Scene assets and water parameters
    pub scene: SceneConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.renderer.validate().map_err(ConfigError::Invalid)?;
        self.scene.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("water_engine_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_default_frames_in_flight() {
        let config = ApplicationConfig::default();
        assert_eq!(config.renderer.max_frames_in_flight, 2);
        assert_eq!((config.window.width, config.window.height), (800, 600));
    }

    #[test]
    fn test_renderer_rejects_frame_counts_out_of_range() {
        let zero = VulkanRendererConfig::default().with_max_frames_in_flight(0);
        assert!(zero.validate().is_err());

        let many = VulkanRendererConfig::default().with_max_frames_in_flight(9);
        assert!(many.validate().is_err());
    }

    #[test]
    fn test_scene_rejects_unaligned_simulation_extent() {
        let mut scene = SceneConfig::default();
        assert!(scene.validate().is_ok());

        scene.simulation_extent = (500, 512);
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_scene_rejects_empty_capture_size() {
        let mut scene = SceneConfig::default();
        scene.capture_size = Some((1024, 0));
        assert!(scene.validate().is_err());

        scene.capture_size = Some((1024, 1024));
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_toml_save_and_load() {
        let path = temp_path("config.toml");
        let mut config = ApplicationConfig::default();
        config.renderer.max_frames_in_flight = 3;
        config.scene.heightmap = Some("resources/textures/height.png".to_string());
        config.scene.capture_size = Some((1024, 768));

        config.save_to_file(&path).expect("save");
        let loaded = ApplicationConfig::load_from_file(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_save_and_load() {
        let path = temp_path("config.ron");
        let mut config = ApplicationConfig::default();
        config.window.title = "Lake".to_string();

        config.save_to_file(&path).expect("save");
        let loaded = ApplicationConfig::load_from_file(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.window.title, "Lake");
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = ApplicationConfig::default().save_to_file(temp_path("config.json"));
        assert!(matches!(err, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_if_exists_tells_missing_from_present() {
        let absent = ApplicationConfig::load_if_exists(temp_path("missing.toml")).expect("no error");
        assert!(absent.is_none());

        let path = temp_path("present.toml");
        let mut config = ApplicationConfig::default();
        config.engine.log_level = "debug".to_string();
        config.save_to_file(&path).expect("save");
        let present = ApplicationConfig::load_if_exists(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(present.map(|c| c.engine.log_level), Some("debug".to_string()));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = ApplicationConfig::load_or_default(temp_path("absent.toml")).expect("defaults");
        assert_eq!(loaded, ApplicationConfig::default());
    }
}
