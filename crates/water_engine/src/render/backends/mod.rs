//! Backend implementations for the render module
//! 
//! Currently only Vulkan is supported, with potential for additional backends in the future.

/// Vulkan rendering backend implementation
pub mod vulkan;
