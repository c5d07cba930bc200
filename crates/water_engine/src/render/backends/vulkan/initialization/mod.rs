//! Vulkan initialization components

pub mod context;
