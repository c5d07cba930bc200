//! Render pass and framebuffer wrappers
//!
//! Every pass in the frame has one color and one depth attachment, both
//! cleared on load. Only the final layouts differ: the water pass ends in
//! `PRESENT_SRC_KHR`, the capture passes end in `SHADER_READ_ONLY_OPTIMAL`
//! so the water pass can sample them.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Final layouts the pass leaves its attachments in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLayouts {
    /// Color attachment final layout
    pub color_final: vk::ImageLayout,
    /// Depth attachment final layout
    pub depth_final: vk::ImageLayout,
}

impl AttachmentLayouts {
    /// Color handed to the presentation engine
    pub fn present() -> Self {
        Self {
            color_final: vk::ImageLayout::PRESENT_SRC_KHR,
            depth_final: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Color sampled by a later pass
    pub fn sampled() -> Self {
        Self {
            color_final: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            depth_final: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }

    /// Whether a later pass reads the color output in a fragment shader
    pub fn color_is_sampled(&self) -> bool {
        self.color_final == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    }
}

/// Subpass dependencies for a single-subpass color + depth pass
pub fn subpass_dependencies(layouts: AttachmentLayouts) -> Vec<vk::SubpassDependency> {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;

    let mut dependencies = vec![vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(attachment_stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(attachment_stages)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .build()];

    if layouts.color_is_sampled() {
        dependencies.push(
            vk::SubpassDependency::builder()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .build(),
        );
    }

    dependencies
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Color + depth pass, both cleared on load
    pub fn new(
        device: Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        layouts: AttachmentLayouts,
    ) -> VulkanResult<Self> {
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(layouts.color_final)
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(layouts.depth_final)
            .build();

        let attachments = [color_attachment, depth_attachment];

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let subpasses = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let dependencies = subpass_dependencies(layouts);

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, render_pass })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Framebuffer over `[color, depth]` views
    pub fn new(
        device: Device,
        render_pass: &RenderPass,
        color: vk::ImageView,
        depth: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let attachments = [color, depth];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, framebuffer })
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_pass_hands_color_to_fragment_reads() {
        let deps = subpass_dependencies(AttachmentLayouts::sampled());
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[1].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[1].dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(deps[1].dst_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_present_pass_has_only_incoming_dependency() {
        let deps = subpass_dependencies(AttachmentLayouts::present());
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert!(deps[0]
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }
}
