//! Command buffer management
//!
//! RAII command pools, a thin recorder over `vk::CommandBuffer`, and the
//! image layout transition table shared by texture uploads and the compute
//! hand-off.

use ash::{vk, Device};
use std::ops::Deref;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.allocate_command_buffers(&alloc_info).map_err(VulkanError::Api) }
    }

    /// Return command buffers to the pool; the caller guarantees they are idle
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, buffers);
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Record, submit and wait for a one-shot command buffer
    ///
    /// Stalls the queue until the work finishes. Only for setup-time uploads.
    pub fn single_time<F>(&self, queue: vk::Queue, record: F) -> VulkanResult<()>
    where
        F: FnOnce(&CommandRecorder<'_>) -> VulkanResult<()>,
    {
        let command_buffers = self.allocate_command_buffers(1)?;
        let recorder = CommandRecorder::new(&self.device, command_buffers[0]);

        let result = recorder
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .and_then(|_| record(&recorder))
            .and_then(|_| recorder.end())
            .and_then(|_| {
                let submit = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
                unsafe {
                    self.device
                        .queue_submit(queue, &[submit], vk::Fence::null())
                        .map_err(VulkanError::Api)?;
                    self.device.queue_wait_idle(queue).map_err(VulkanError::Api)
                }
            });

        self.free_command_buffers(&command_buffers);
        result
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            // Frees every command buffer allocated from the pool
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Access masks and stages for one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing the source accesses
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming the destination accesses
    pub dst_stage: vk::PipelineStageFlags,
}

/// Graphics stages that sample the simulation images
pub fn graphics_read_stages() -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
}

/// Barrier masks for a supported layout transition
pub fn layout_transition(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let shader_rw = A::SHADER_READ | A::SHADER_WRITE;
    let shader_stages = S::COMPUTE_SHADER | graphics_read_stages();

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER),
        (L::UNDEFINED, L::GENERAL) => (A::empty(), A::TRANSFER_WRITE | shader_rw, S::TOP_OF_PIPE, S::TRANSFER | S::COMPUTE_SHADER),
        (L::TRANSFER_DST_OPTIMAL, L::GENERAL) => (A::TRANSFER_WRITE, shader_rw, S::TRANSFER, shader_stages),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL) => (shader_rw, A::TRANSFER_READ, shader_stages, S::TRANSFER),
        (L::GENERAL, L::TRANSFER_DST_OPTIMAL) => (shader_rw, A::TRANSFER_WRITE, shader_stages, S::TRANSFER),
        (L::TRANSFER_SRC_OPTIMAL, L::GENERAL) => (A::TRANSFER_READ, shader_rw, S::TRANSFER, shader_stages),
        _ => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

/// Thin recorder over a command buffer owned by a pool
pub struct CommandRecorder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Wrap `command_buffer` for recording
    pub fn new(device: &'a Device, command_buffer: vk::CommandBuffer) -> Self {
        Self { device, command_buffer }
    }

    /// Raw handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Begin command recording
    pub fn begin(&self, flags: vk::CommandBufferUsageFlags) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    /// End command recording
    pub fn end(&self) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer).map_err(VulkanError::Api) }
    }

    /// Begin a render pass; it ends when the returned guard drops
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_, 'a> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(self.command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
        }

        ActiveRenderPass { recorder: self }
    }

    /// Bind a pipeline
    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
    }

    /// Bind descriptor sets starting at `first_set`
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, first_set, sets, &[]);
        }
    }

    /// Bind vertex buffers
    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, first_binding, buffers, offsets);
        }
    }

    /// Bind a 32-bit index buffer
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    /// Draw indexed
    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, first_index, vertex_offset, 0);
        }
    }

    /// Push constants to shaders
    pub fn push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, data: &[u8]) {
        unsafe {
            self.device
                .cmd_push_constants(self.command_buffer, layout, stages, 0, data);
        }
    }

    /// Dispatch compute work groups
    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        unsafe {
            self.device.cmd_dispatch(self.command_buffer, x, y, z);
        }
    }

    /// Global memory barrier
    pub fn memory_barrier(
        &self,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        let barrier = vk::MemoryBarrier::builder()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    /// Transition every listed image from `old` to `new` in one barrier
    pub fn transition_images(
        &self,
        images: &[vk::Image],
        aspect: vk::ImageAspectFlags,
        layer_count: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let masks = layout_transition(old, new)?;
        let barriers: Vec<vk::ImageMemoryBarrier> = images
            .iter()
            .map(|&image| {
                vk::ImageMemoryBarrier::builder()
                    .old_layout(old)
                    .new_layout(new)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(subresource_range(aspect, layer_count))
                    .src_access_mask(masks.src_access)
                    .dst_access_mask(masks.dst_access)
                    .build()
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            );
        }
        Ok(())
    }

    /// Transition a single image
    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        layer_count: u32,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> VulkanResult<()> {
        self.transition_images(&[image], aspect, layer_count, old, new)
    }

    /// Copy `size` bytes between buffers
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
    }

    /// Copy tightly packed layers from a buffer into an image in `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D, layer_count: u32) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(subresource_layers(layer_count))
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .build();

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.command_buffer,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Copy a whole color image from `TRANSFER_SRC_OPTIMAL` into `TRANSFER_DST_OPTIMAL`
    pub fn copy_image(&self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::ImageCopy::builder()
            .src_subresource(subresource_layers(1))
            .dst_subresource(subresource_layers(1))
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .build();

        unsafe {
            self.device.cmd_copy_image(
                self.command_buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Clear a color image held in `layout`
    pub fn clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            self.device.cmd_clear_color_image(
                self.command_buffer,
                image,
                layout,
                &clear,
                &[subresource_range(vk::ImageAspectFlags::COLOR, 1)],
            );
        }
    }
}

/// Active render pass; ends the pass on drop
pub struct ActiveRenderPass<'r, 'a> {
    recorder: &'r CommandRecorder<'a>,
}

impl<'r, 'a> Deref for ActiveRenderPass<'r, 'a> {
    type Target = CommandRecorder<'a>;

    fn deref(&self) -> &Self::Target {
        self.recorder
    }
}

impl<'r, 'a> Drop for ActiveRenderPass<'r, 'a> {
    fn drop(&mut self) {
        unsafe {
            self.recorder.device.cmd_end_render_pass(self.recorder.command_buffer);
        }
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count,
    }
}

fn subresource_layers(layer_count: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn test_upload_transitions() {
        let to_dst = layout_transition(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).expect("supported");
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);

        let to_read = layout_transition(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).expect("supported");
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_compute_handoff_round_trips_through_general() {
        for transfer in [L::TRANSFER_SRC_OPTIMAL, L::TRANSFER_DST_OPTIMAL] {
            let out = layout_transition(L::GENERAL, transfer).expect("out of GENERAL");
            let back = layout_transition(transfer, L::GENERAL).expect("back to GENERAL");
            assert_eq!(out.dst_stage, vk::PipelineStageFlags::TRANSFER);
            assert!(back.dst_stage.contains(graphics_read_stages()));
            assert!(out.src_stage.contains(vk::PipelineStageFlags::VERTEX_SHADER));
            assert!(back.dst_access.contains(vk::AccessFlags::SHADER_READ));
        }
    }

    #[test]
    fn test_unsupported_transition_is_an_error() {
        let err = layout_transition(L::SHADER_READ_ONLY_OPTIMAL, L::PRESENT_SRC_KHR);
        assert!(matches!(
            err,
            Err(VulkanError::UnsupportedLayoutTransition { old: L::SHADER_READ_ONLY_OPTIMAL, .. })
        ));
    }
}
