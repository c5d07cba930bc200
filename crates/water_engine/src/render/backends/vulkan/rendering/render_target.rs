//! # Render Target
//!
//! A render pass, one framebuffer and one command buffer per swapchain image,
//! and the pipelines drawn inside that pass.
//!
//! A target either renders into the swapchain ([`RenderTarget::set_to_default_fbo`])
//! or into its own color + depth attachments that later passes sample
//! ([`RenderTarget::init_fbo`]). The two modes are exclusive for the life of
//! the target.

use ash::{vk, Device};
use std::path::Path;

use crate::render::backends::vulkan::rendering::pipeline::{GraphicsPipeline, PipelineOptions};
use crate::render::backends::vulkan::rendering::render_pass::{AttachmentLayouts, Framebuffer, RenderPass};
use crate::render::backends::vulkan::resources::image::{Image, ImageDesc, ImageView, Sampler};
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::{VulkanContext, VulkanResult};

/// Which attachments a target's framebuffers point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// No framebuffers yet
    Unset,
    /// Swapchain color and depth views
    Default,
    /// Attachments owned by the target
    Owned,
}

impl TargetMode {
    /// Move to `want`
    ///
    /// # Panics
    /// When the target is already in the other mode.
    pub fn claim(self, want: TargetMode, tag: &str) -> TargetMode {
        match (self, want) {
            (TargetMode::Unset, _) => want,
            (current, want) if current == want => want,
            (current, want) => panic!(
                "render target '{}' is in {:?} mode and cannot switch to {:?}",
                tag, current, want
            ),
        }
    }
}

/// Size of an owned capture target: the configured size, else the swapchain's
pub fn capture_extent(requested: Option<(u32, u32)>, swapchain: vk::Extent2D) -> vk::Extent2D {
    match requested {
        Some((width, height)) if width > 0 && height > 0 => vk::Extent2D { width, height },
        _ => swapchain,
    }
}

struct OwnedAttachments {
    color_sampler: Sampler,
    color_view: ImageView,
    depth_view: ImageView,
    _color: Image,
    _depth: Image,
}

/// Pass, framebuffers, command buffers and pipelines for one render stage
pub struct RenderTarget {
    device: Device,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    pipelines: Vec<GraphicsPipeline>,
    framebuffers: Vec<Framebuffer>,
    attachments: Vec<OwnedAttachments>,
    render_pass: RenderPass,
    mode: TargetMode,
    extent: vk::Extent2D,
    tag: String,
}

impl RenderTarget {
    /// Build the pass and one command buffer per swapchain image
    pub fn new(
        context: &VulkanContext,
        tag: impl Into<String>,
        layouts: AttachmentLayouts,
        swapchain: &Swapchain,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let render_pass = RenderPass::new(device.clone(), swapchain.format(), swapchain.depth_format(), layouts)?;
        let command_buffers = context
            .graphics_pool()
            .allocate_command_buffers(swapchain.size() as u32)?;

        Ok(Self {
            device,
            command_pool: context.graphics_pool().handle(),
            command_buffers,
            pipelines: Vec::new(),
            framebuffers: Vec::new(),
            attachments: Vec::new(),
            render_pass,
            mode: TargetMode::Unset,
            extent: swapchain.extent(),
            tag: tag.into(),
        })
    }

    /// Render straight into the swapchain images
    ///
    /// # Panics
    /// When [`Self::init_fbo`] already ran on this target.
    pub fn set_to_default_fbo(&mut self, swapchain: &Swapchain) -> VulkanResult<()> {
        self.mode = self.mode.claim(TargetMode::Default, &self.tag);
        self.extent = swapchain.extent();
        self.framebuffers = (0..swapchain.size())
            .map(|i| {
                Framebuffer::new(
                    self.device.clone(),
                    &self.render_pass,
                    swapchain.view(i),
                    swapchain.depth_view(i),
                    self.extent,
                )
            })
            .collect::<VulkanResult<_>>()?;
        Ok(())
    }

    /// Render into owned `width`×`height` color and depth attachments, one pair per swapchain image
    ///
    /// # Panics
    /// When [`Self::set_to_default_fbo`] already ran on this target.
    pub fn init_fbo(&mut self, context: &VulkanContext, swapchain: &Swapchain, width: u32, height: u32) -> VulkanResult<()> {
        self.mode = self.mode.claim(TargetMode::Owned, &self.tag);
        self.extent = vk::Extent2D { width, height };
        self.framebuffers.clear();
        self.attachments.clear();

        for _ in 0..swapchain.size() {
            let color = Image::new(
                context,
                ImageDesc::new(
                    self.extent,
                    swapchain.format(),
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                ),
            )?;
            let depth = Image::new(
                context,
                ImageDesc::new(
                    self.extent,
                    swapchain.depth_format(),
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ),
            )?;
            let color_view = color.create_view(vk::ImageAspectFlags::COLOR)?;
            let depth_view = depth.create_view(vk::ImageAspectFlags::DEPTH)?;

            self.framebuffers.push(Framebuffer::new(
                self.device.clone(),
                &self.render_pass,
                color_view.handle(),
                depth_view.handle(),
                self.extent,
            )?);
            self.attachments.push(OwnedAttachments {
                color_sampler: Sampler::new(context, vk::SamplerAddressMode::CLAMP_TO_EDGE)?,
                color_view,
                depth_view,
                _color: color,
                _depth: depth,
            });
        }

        log::debug!(
            "Render target '{}': {} owned framebuffers at {}x{}",
            self.tag,
            self.framebuffers.len(),
            width,
            height
        );
        Ok(())
    }

    /// Add a pipeline with default culling; returns its index
    pub fn add_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        vertex: &Path,
        fragment: &Path,
        depth_test: bool,
    ) -> VulkanResult<usize> {
        let options = PipelineOptions {
            depth_test,
            ..PipelineOptions::default()
        };
        self.add_pipeline_with(layout, vertex, fragment, options)
    }

    /// Add a pipeline with explicit fixed-function options; returns its index
    pub fn add_pipeline_with(
        &mut self,
        layout: vk::PipelineLayout,
        vertex: &Path,
        fragment: &Path,
        options: PipelineOptions,
    ) -> VulkanResult<usize> {
        let pipeline = GraphicsPipeline::new(
            &self.device,
            self.render_pass.handle(),
            layout,
            self.extent,
            vertex,
            fragment,
            options,
        )?;
        self.pipelines.push(pipeline);
        Ok(self.pipelines.len() - 1)
    }

    fn owned(&self, i: usize) -> &OwnedAttachments {
        assert!(
            self.mode == TargetMode::Owned,
            "render target '{}' has no owned attachments",
            self.tag
        );
        &self.attachments[i]
    }

    /// Color view for swapchain image `i` (owned mode)
    pub fn color_view(&self, i: usize) -> vk::ImageView {
        self.owned(i).color_view.handle()
    }

    /// Color sampler for swapchain image `i` (owned mode)
    pub fn color_sampler(&self, i: usize) -> vk::Sampler {
        self.owned(i).color_sampler.handle()
    }

    /// Depth view for swapchain image `i` (owned mode)
    pub fn depth_view(&self, i: usize) -> vk::ImageView {
        self.owned(i).depth_view.handle()
    }

    /// Framebuffer for swapchain image `i`
    pub fn framebuffer(&self, i: usize) -> vk::Framebuffer {
        self.framebuffers[i].handle()
    }

    /// Command buffer for swapchain image `i`
    pub fn command_buffer(&self, i: usize) -> vk::CommandBuffer {
        self.command_buffers[i]
    }

    /// All command buffers, indexed by swapchain image
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    /// Pipeline `i` in the order added
    pub fn pipeline(&self, i: usize) -> vk::Pipeline {
        self.pipelines[i].handle()
    }

    /// Render pass handle
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    /// Framebuffer size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Current framebuffer mode
    pub fn mode(&self) -> TargetMode {
        self.mode
    }

    /// Name used in logs and panics
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if !self.command_buffers.is_empty() {
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_claim_sets_mode() {
        assert_eq!(TargetMode::Unset.claim(TargetMode::Owned, "t"), TargetMode::Owned);
        assert_eq!(TargetMode::Unset.claim(TargetMode::Default, "t"), TargetMode::Default);
    }

    #[test]
    fn test_reclaiming_same_mode_is_allowed() {
        assert_eq!(TargetMode::Owned.claim(TargetMode::Owned, "t"), TargetMode::Owned);
    }

    #[test]
    #[should_panic(expected = "render target 'refraction' is in Owned mode")]
    fn test_default_after_owned_panics() {
        TargetMode::Owned.claim(TargetMode::Default, "refraction");
    }

    #[test]
    #[should_panic(expected = "cannot switch to Owned")]
    fn test_owned_after_default_panics() {
        TargetMode::Default.claim(TargetMode::Owned, "water");
    }

    #[test]
    fn test_capture_extent_follows_swapchain_through_resize() {
        let sizes = [(1280, 768), (640, 480), (1280, 768)];
        for (width, height) in sizes {
            let swapchain = vk::Extent2D { width, height };
            assert_eq!(capture_extent(None, swapchain), swapchain);
        }
    }

    #[test]
    fn test_capture_extent_uses_configured_size() {
        let swapchain = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(
            capture_extent(Some((1024, 1024)), swapchain),
            vk::Extent2D {
                width: 1024,
                height: 1024
            }
        );
        assert_eq!(capture_extent(Some((0, 512)), swapchain), swapchain);
    }
}
