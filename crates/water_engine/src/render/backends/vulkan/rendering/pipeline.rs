//! Graphics and compute pipelines
//!
//! Pipelines own only the `vk::Pipeline`; layouts belong to the descriptor
//! registry and outlive every pipeline built from them.

use ash::{vk, Device};
use std::path::Path;

use crate::render::backends::vulkan::rendering::shader::ShaderModule;
use crate::render::backends::vulkan::rendering::vertex_layout::VulkanVertexLayout;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Fixed-function knobs that vary between the passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Depth test and write against the pass's depth attachment
    pub depth_test: bool,
    /// Faces to cull
    pub cull_mode: vk::CullModeFlags,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            depth_test: true,
            cull_mode: vk::CullModeFlags::BACK,
        }
    }
}

impl PipelineOptions {
    /// Options for geometry drawn through the mirror about the water plane
    ///
    /// The mirror flips winding, so the culled face swaps.
    pub fn mirrored(self) -> Self {
        let cull_mode = match self.cull_mode {
            vk::CullModeFlags::BACK => vk::CullModeFlags::FRONT,
            vk::CullModeFlags::FRONT => vk::CullModeFlags::BACK,
            other => other,
        };
        Self { cull_mode, ..self }
    }

    /// Same options with a different culled face
    pub fn culling(self, cull_mode: vk::CullModeFlags) -> Self {
        Self { cull_mode, ..self }
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl GraphicsPipeline {
    /// Build a pipeline for the shared vertex layout with a fixed viewport
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        extent: vk::Extent2D,
        vertex_path: &Path,
        fragment_path: &Path,
        options: PipelineOptions,
    ) -> VulkanResult<Self> {
        let vertex_shader = ShaderModule::from_file(device, vertex_path)?;
        let fragment_shader = ShaderModule::from_file(device, fragment_path)?;
        let shader_stages = [
            vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [VulkanVertexLayout::binding_description()];
        let attributes = VulkanVertexLayout::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(options.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(options.depth_test)
            .depth_write_enable(options.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        };

        Ok(Self {
            device: device.clone(),
            pipeline: pipelines[0],
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Compute pipeline wrapper with RAII cleanup
pub struct ComputePipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl ComputePipeline {
    /// Build a compute pipeline from one SPIR-V file
    pub fn new(device: &Device, layout: vk::PipelineLayout, shader_path: &Path) -> VulkanResult<Self> {
        let shader = ShaderModule::from_file(device, shader_path)?;
        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(shader.stage_info(vk::ShaderStageFlags::COMPUTE))
            .layout(layout)
            .build();

        let pipelines = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        };

        Ok(Self {
            device: device.clone(),
            pipeline: pipelines[0],
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrored_swaps_culled_face() {
        let base = PipelineOptions::default();
        assert_eq!(base.cull_mode, vk::CullModeFlags::BACK);

        let mirrored = base.mirrored();
        assert_eq!(mirrored.cull_mode, vk::CullModeFlags::FRONT);
        assert!(mirrored.depth_test);
        assert_eq!(mirrored.mirrored(), base);
    }

    #[test]
    fn test_mirroring_without_culling_is_a_no_op() {
        let none = PipelineOptions::default().culling(vk::CullModeFlags::NONE);
        assert_eq!(none.mirrored(), none);
    }
}
