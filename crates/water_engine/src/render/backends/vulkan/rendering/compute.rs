//! # Compute Stage
//!
//! Height-field simulation on storage images. Each swapchain image gets its
//! own three images:
//!
//! - **ping**: the previous state, read by the shader
//! - **pong**: the new state, written by the shader
//! - **display**: a copy of the new state the water pass samples
//!
//! After the dispatch, pong is copied back into ping for the next step and
//! into display for rendering. Every image rests in `GENERAL` between frames.

use ash::{vk, Device};
use std::path::Path;

use crate::assets::RgbaImage;
use crate::render::backends::vulkan::rendering::commands::{graphics_read_stages, CommandRecorder};
use crate::render::backends::vulkan::rendering::pipeline::ComputePipeline;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::image::{Image, ImageDesc, ImageView, Sampler};
use crate::render::backends::vulkan::resources::registry::{DescriptorRegistry, MeshId, PipeLayoutId};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Storage image format of the height field
pub const SIMULATION_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Workgroup edge declared by the simulation shader
pub const WORKGROUP_SIZE: u32 = 32;

/// Unseeded texel: height and previous height both at rest
pub const REST_COLOR: [f32; 4] = [0.5, 0.5, 0.0, 1.0];

/// What an image is used for within one simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    /// Previous state
    Ping = 0,
    /// New state
    Pong = 1,
    /// Copy of the new state for sampling
    Display = 2,
}

impl ImageRole {
    /// Every role in storage order
    pub const ALL: [ImageRole; 3] = [ImageRole::Ping, ImageRole::Pong, ImageRole::Display];

    /// Flat index of this role's image for swapchain image `image`
    pub fn index(self, image: usize, image_count: usize) -> usize {
        self as usize * image_count + image
    }
}

/// One recorded command of a simulation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeStep {
    /// Order last frame's shader accesses before this dispatch
    ShaderBarrier,
    /// Bind the simulation pipeline
    BindPipeline,
    /// Bind the per-image descriptor sets
    BindDescriptors,
    /// Dispatch workgroups
    Dispatch {
        /// Groups along x
        x: u32,
        /// Groups along y
        y: u32,
    },
    /// Move images between layouts
    Transition {
        /// Images affected
        roles: Vec<ImageRole>,
        /// Current layout
        old: vk::ImageLayout,
        /// Target layout
        new: vk::ImageLayout,
    },
    /// Whole-image copy
    Copy {
        /// Source in `TRANSFER_SRC_OPTIMAL`
        src: ImageRole,
        /// Destination in `TRANSFER_DST_OPTIMAL`
        dst: ImageRole,
    },
}

/// Commands for one simulation step over an `extent` height field
pub fn simulation_schedule(extent: vk::Extent2D) -> Vec<ComputeStep> {
    use vk::ImageLayout as L;
    use ComputeStep::*;
    use ImageRole::*;

    vec![
        ShaderBarrier,
        BindPipeline,
        BindDescriptors,
        Dispatch {
            x: (extent.width / WORKGROUP_SIZE).max(1),
            y: (extent.height / WORKGROUP_SIZE).max(1),
        },
        Transition {
            roles: vec![Pong],
            old: L::GENERAL,
            new: L::TRANSFER_SRC_OPTIMAL,
        },
        Transition {
            roles: vec![Ping],
            old: L::GENERAL,
            new: L::TRANSFER_DST_OPTIMAL,
        },
        Copy { src: Pong, dst: Ping },
        Transition {
            roles: vec![Display],
            old: L::GENERAL,
            new: L::TRANSFER_DST_OPTIMAL,
        },
        Copy { src: Pong, dst: Display },
        Transition {
            roles: vec![Pong],
            old: L::TRANSFER_SRC_OPTIMAL,
            new: L::GENERAL,
        },
        Transition {
            roles: vec![Ping, Display],
            old: L::TRANSFER_DST_OPTIMAL,
            new: L::GENERAL,
        },
    ]
}

struct StorageImage {
    sampler: Sampler,
    view: ImageView,
    image: Image,
}

/// Simulation images, pipelines and per-image command buffers
pub struct ComputeStage {
    device: Device,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    pipelines: Vec<ComputePipeline>,
    images: Vec<StorageImage>,
    image_count: usize,
    extent: vk::Extent2D,
    tag: String,
}

impl ComputeStage {
    /// Create `3 × image_count` storage images, optionally seeded, all left in `GENERAL`
    pub fn new(
        context: &VulkanContext,
        tag: impl Into<String>,
        image_count: usize,
        extent: vk::Extent2D,
        seed: Option<&RgbaImage>,
    ) -> VulkanResult<Self> {
        let tag = tag.into();
        let usage = vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::SAMPLED
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;

        let images = (0..ImageRole::ALL.len() * image_count)
            .map(|_| {
                let image = Image::new(context, ImageDesc::new(extent, SIMULATION_FORMAT, usage))?;
                Ok(StorageImage {
                    sampler: Sampler::new(context, vk::SamplerAddressMode::CLAMP_TO_EDGE)?,
                    view: image.create_view(vk::ImageAspectFlags::COLOR)?,
                    image,
                })
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let handles: Vec<vk::Image> = images.iter().map(|i| i.image.handle()).collect();
        match seed {
            Some(seed) => seed_images(context, &handles, extent, seed)?,
            None => clear_images(context, &handles)?,
        }

        let command_buffers = context
            .compute_pool()
            .allocate_command_buffers(image_count as u32)?;

        log::debug!(
            "Compute stage '{}': {} storage images at {}x{}{}",
            tag,
            images.len(),
            extent.width,
            extent.height,
            if seed.is_some() { ", seeded" } else { "" }
        );

        Ok(Self {
            device: context.raw_device(),
            command_pool: context.compute_pool().handle(),
            command_buffers,
            pipelines: Vec::new(),
            images,
            image_count,
            extent,
            tag,
        })
    }

    /// Add a compute pipeline; returns its index
    pub fn add_pipeline(&mut self, layout: vk::PipelineLayout, shader: &Path) -> VulkanResult<usize> {
        self.pipelines.push(ComputePipeline::new(&self.device, layout, shader)?);
        Ok(self.pipelines.len() - 1)
    }

    /// Record one simulation step into every per-image command buffer
    pub fn record(
        &self,
        registry: &DescriptorRegistry,
        mesh: MeshId,
        pipe_layout: PipeLayoutId,
        pipeline: usize,
    ) -> VulkanResult<()> {
        let schedule = simulation_schedule(self.extent);

        for (i, &command_buffer) in self.command_buffers.iter().enumerate() {
            let cmd = CommandRecorder::new(&self.device, command_buffer);
            cmd.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;

            for step in &schedule {
                match step {
                    ComputeStep::ShaderBarrier => {
                        let shader_rw = vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
                        cmd.memory_barrier(
                            shader_rw,
                            shader_rw,
                            vk::PipelineStageFlags::COMPUTE_SHADER | graphics_read_stages(),
                            vk::PipelineStageFlags::COMPUTE_SHADER,
                        );
                    }
                    ComputeStep::BindPipeline => {
                        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipelines[pipeline].handle());
                    }
                    ComputeStep::BindDescriptors => {
                        registry.bind_descriptors(&cmd, vk::PipelineBindPoint::COMPUTE, mesh, i, pipe_layout);
                    }
                    ComputeStep::Dispatch { x, y } => cmd.dispatch(*x, *y, 1),
                    ComputeStep::Transition { roles, old, new } => {
                        let images: Vec<vk::Image> = roles.iter().map(|&role| self.image(role, i)).collect();
                        cmd.transition_images(&images, vk::ImageAspectFlags::COLOR, 1, *old, *new)?;
                    }
                    ComputeStep::Copy { src, dst } => {
                        cmd.copy_image(self.image(*src, i), self.image(*dst, i), self.extent);
                    }
                }
            }

            cmd.end()?;
        }

        log::trace!("Compute stage '{}' recorded {} command buffers", self.tag, self.command_buffers.len());
        Ok(())
    }

    fn storage(&self, role: ImageRole, i: usize) -> &StorageImage {
        assert!(
            i < self.image_count,
            "compute stage '{}' has {} images per role, asked for {}",
            self.tag,
            self.image_count,
            i
        );
        &self.images[role.index(i, self.image_count)]
    }

    /// Image for `role` and swapchain image `i`
    pub fn image(&self, role: ImageRole, i: usize) -> vk::Image {
        self.storage(role, i).image.handle()
    }

    /// View for `role` and swapchain image `i`
    pub fn view(&self, role: ImageRole, i: usize) -> vk::ImageView {
        self.storage(role, i).view.handle()
    }

    /// Sampler for `role` and swapchain image `i`
    pub fn sampler(&self, role: ImageRole, i: usize) -> vk::Sampler {
        self.storage(role, i).sampler.handle()
    }

    /// Command buffer for swapchain image `i`
    pub fn command_buffer(&self, i: usize) -> vk::CommandBuffer {
        self.command_buffers[i]
    }

    /// Height-field size
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for ComputeStage {
    fn drop(&mut self) {
        if !self.command_buffers.is_empty() {
            unsafe {
                self.device
                    .free_command_buffers(self.command_pool, &self.command_buffers);
            }
        }
    }
}

fn seed_images(context: &VulkanContext, images: &[vk::Image], extent: vk::Extent2D, seed: &RgbaImage) -> VulkanResult<()> {
    if (seed.width, seed.height) != (extent.width, extent.height) {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "simulation seed is {}x{}, expected {}x{}",
                seed.width, seed.height, extent.width, extent.height
            ),
        });
    }

    let staging = Buffer::host_visible(
        context,
        seed.pixels.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    staging.write(&seed.pixels)?;

    context.graphics_pool().single_time(context.graphics_queue(), |cmd| {
        cmd.transition_images(
            images,
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        for &image in images {
            cmd.copy_buffer_to_image(staging.handle(), image, extent, 1);
        }
        cmd.transition_images(
            images,
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::GENERAL,
        )
    })
}

fn clear_images(context: &VulkanContext, images: &[vk::Image]) -> VulkanResult<()> {
    context.graphics_pool().single_time(context.graphics_queue(), |cmd| {
        cmd.transition_images(
            images,
            vk::ImageAspectFlags::COLOR,
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        )?;
        for &image in images {
            cmd.clear_color_image(image, vk::ImageLayout::GENERAL, REST_COLOR);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::rendering::commands::layout_transition;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_role_indexing_is_role_major() {
        assert_eq!(ImageRole::Ping.index(0, 3), 0);
        assert_eq!(ImageRole::Pong.index(2, 3), 5);
        assert_eq!(ImageRole::Display.index(1, 3), 7);
    }

    #[test]
    fn test_dispatch_covers_grid_in_32_wide_groups() {
        let schedule = simulation_schedule(extent(512, 256));
        assert!(schedule.contains(&ComputeStep::Dispatch { x: 16, y: 8 }));

        let tiny = simulation_schedule(extent(16, 16));
        assert!(tiny.contains(&ComputeStep::Dispatch { x: 1, y: 1 }));
    }

    #[test]
    fn test_schedule_dispatches_before_copies() {
        let schedule = simulation_schedule(extent(512, 512));
        let dispatch = schedule
            .iter()
            .position(|s| matches!(s, ComputeStep::Dispatch { .. }))
            .expect("dispatch");
        let copies: Vec<usize> = schedule
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, ComputeStep::Copy { .. }))
            .map(|(i, _)| i)
            .collect();

        assert_eq!(schedule[0], ComputeStep::ShaderBarrier);
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|&c| c > dispatch));
        assert_eq!(schedule[copies[0]], ComputeStep::Copy { src: ImageRole::Pong, dst: ImageRole::Ping });
        assert_eq!(schedule[copies[1]], ComputeStep::Copy { src: ImageRole::Pong, dst: ImageRole::Display });
    }

    /// Replaying the transitions must return every image to `GENERAL`, using only supported transitions
    #[test]
    fn test_schedule_leaves_every_image_general() {
        let mut layouts = [vk::ImageLayout::GENERAL; 3];

        for step in simulation_schedule(extent(512, 512)) {
            match step {
                ComputeStep::Transition { roles, old, new } => {
                    assert!(layout_transition(old, new).is_ok());
                    for role in roles {
                        assert_eq!(layouts[role as usize], old, "{:?} not in {:?}", role, old);
                        layouts[role as usize] = new;
                    }
                }
                ComputeStep::Copy { src, dst } => {
                    assert_eq!(layouts[src as usize], vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
                    assert_eq!(layouts[dst as usize], vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                }
                _ => {}
            }
        }

        assert_eq!(layouts, [vk::ImageLayout::GENERAL; 3]);
    }
}
