//! Vulkan state management

pub mod swapchain;
pub mod sync;
