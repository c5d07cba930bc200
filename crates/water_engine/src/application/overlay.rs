//! Overlay seam
//!
//! A debug UI or HUD plugs in here. It renders into the swapchain image after
//! the surface pass, in its own command buffer, and is told whenever the
//! swapchain is rebuilt.

use ash::vk;

use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::{VulkanContext, VulkanResult};

/// Something drawn on top of the finished frame
pub trait Overlay {
    /// The swapchain now has `count` images
    fn image_count_changed(&mut self, count: usize);

    /// Rebuild swapchain-dependent state (render pass, framebuffers)
    fn on_resize(&mut self, context: &VulkanContext, swapchain: &Swapchain) -> VulkanResult<()>;

    /// Command buffer to submit after the surface pass for `image`, if any
    ///
    /// Called after the image's fence was waited on, so the buffer may be
    /// re-recorded here.
    fn command_buffer(&mut self, image: usize) -> VulkanResult<Option<vk::CommandBuffer>>;
}

/// Overlay that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn image_count_changed(&mut self, _count: usize) {}

    fn on_resize(&mut self, _context: &VulkanContext, _swapchain: &Swapchain) -> VulkanResult<()> {
        Ok(())
    }

    fn command_buffer(&mut self, _image: usize) -> VulkanResult<Option<vk::CommandBuffer>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overlay_submits_nothing() {
        let mut overlay = NoOverlay;
        overlay.image_count_changed(3);
        assert_eq!(overlay.command_buffer(0).expect("no-op"), None);
    }
}
