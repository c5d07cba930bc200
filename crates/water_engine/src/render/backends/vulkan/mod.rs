//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules.

/// Instance, device and queue bootstrap
pub mod initialization;

/// Buffers, images, textures, descriptors and uniform blocks
pub mod resources;

/// Commands, render passes, pipelines, render targets and the compute stage
pub mod rendering;

/// Swapchain and synchronization primitives
pub mod state;

// Re-export core initialization types
pub use initialization::context::{VulkanContext, VulkanError, VulkanResult, PhysicalDeviceInfo, QueueFamilies};

// Re-export resource types
pub use resources::buffer::Buffer;
pub use resources::texture::{CubeMap, Sampled, Texture};
pub use resources::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter, PipelineLayout};
pub use resources::registry::{DescriptorRegistry, LayoutId, MeshDesc, MeshId, PipeLayoutId};
pub use resources::uniform::{ClipPlane, SimulationInput, UniformBufferObject};

// Re-export rendering types
pub use rendering::commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use rendering::compute::{ComputeStage, ImageRole};
pub use rendering::pipeline::PipelineOptions;
pub use rendering::render_pass::AttachmentLayouts;
pub use rendering::render_target::RenderTarget;

// Re-export state types
pub use state::swapchain::{Swapchain, SwapchainStatus};
pub use state::sync::{Fence, FrameCounter, FrameSync, ImageFenceTracker, Semaphore};
