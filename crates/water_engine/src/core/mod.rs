//! # Core Module
//!
//! Shared configuration types. The `config` submodule holds the concrete
//! application settings; the generic file loading lives in [`crate::config`].

pub mod config;

pub use config::{
    ApplicationConfig,
    EngineConfig,
    SceneConfig,
    ShaderConfig,
    VulkanRendererConfig,
    WindowConfig,
    Config,
    ConfigError,
};
