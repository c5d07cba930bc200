//! Vulkan resource management
//!
//! GPU memory, buffers, images and textures, plus the descriptor registry
//! that ties uniform buffers and samplers to meshes per swapchain image.

/// Memory type selection and allocation
pub mod memory;

/// Buffer types (vertex, index, staging, uniform)
pub mod buffer;

/// Images, views and samplers
pub mod image;

/// Texture and cube map uploads
pub mod texture;

/// Descriptor set layouts, pools and writes
pub mod descriptor_set;

/// Per-frame slot storage
pub mod arena;

/// Descriptor and pipeline layout registry
pub mod registry;

/// Uniform and push constant blocks
pub mod uniform;
