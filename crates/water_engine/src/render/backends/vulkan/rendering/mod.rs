//! Vulkan rendering components

pub mod commands;
pub mod compute;
pub mod pipeline;
pub mod render_pass;
pub mod render_target;
pub mod shader;
pub mod vertex_layout;
