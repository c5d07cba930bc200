//! # Water Engine
//!
//! A multi-pass Vulkan water renderer.
//!
//! ## Features
//!
//! - **Compute Height Field**: a ping-pong storage image simulation, one
//!   dispatch per frame, sampled by the water surface
//! - **Refraction and Reflection Captures**: two offscreen passes rendered
//!   with a clip plane, the reflection through a mirror about the water
//! - **Swapchain Recreation**: every size-dependent resource is rebuilt on
//!   resize, suboptimal present or minimize/restore
//! - **Descriptor Registry**: per-mesh, per-image descriptor sets and uniform
//!   buffers from a single pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use water_engine::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     let config = ApplicationConfig::load_or_default("config/water.toml")?;
//!     config.validate()?;
//!     water_engine::application::run(config)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;
pub mod config;
pub mod foundation;
pub mod assets;
pub mod render;
pub mod scene;
pub mod application;

pub use application::{AppError, AppResult, WaterApplication};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        AppError, AppResult, WaterApplication,
        application::overlay::{NoOverlay, Overlay},
        foundation::{
            math::{Vec3, Mat4, Transform},
            time::Timer,
        },
        render::{Camera, Window},
        core::config::{ApplicationConfig, SceneConfig, ShaderConfig, VulkanRendererConfig, WindowConfig},
        config::Config,
    };
}
