//! # Rendering System
//!
//! Window, camera and the Vulkan backend.
//!
//! ## Architecture
//!
//! - **Window**: GLFW window, resize flag and input sampling
//! - **Camera**: quaternion fly camera with a Vulkan-convention projection
//! - **Vulkan Backend**: RAII wrappers, the descriptor registry, render
//!   targets and the compute stage

pub mod camera;
pub mod window;

/// Graphics backend implementations
pub mod backends;

pub use camera::{Camera, CameraInput};
pub use window::{Window, WindowError, WindowResult};
