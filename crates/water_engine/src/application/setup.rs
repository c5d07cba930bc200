//! Resource setup for the water scene
//!
//! Three lifetimes, built in this order:
//!
//! 1. [`SceneAssets`]: geometry buffers and textures, built once
//! 2. [`SceneLayout`]: descriptor layouts, pipeline layouts and registry
//!    meshes, declared once
//! 3. [`SwapchainResources`]: the swapchain and everything sized by its image
//!    count (descriptor pool, render targets, compute stage, recorded command
//!    buffers), rebuilt on every recreate

use ash::{vk, Device};
use std::path::Path;

use crate::application::AppResult;
use crate::assets::{load_cube_faces, load_obj, load_rgba, RgbaImage};
use crate::core::config::{ApplicationConfig, SceneConfig};
use crate::render::backends::vulkan::rendering::commands::CommandRecorder;
use crate::render::backends::vulkan::rendering::compute::{ComputeStage, ImageRole};
use crate::render::backends::vulkan::rendering::pipeline::PipelineOptions;
use crate::render::backends::vulkan::rendering::render_target::{capture_extent, RenderTarget};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorSetWriter;
use crate::render::backends::vulkan::resources::registry::{
    DescriptorRegistry, LayoutId, MeshDesc, MeshId, PipeLayoutId,
};
use crate::render::backends::vulkan::resources::texture::{CubeMap, Sampled, Texture};
use crate::render::backends::vulkan::resources::uniform::{ClipPlane, UniformBufferObject};
use crate::render::backends::vulkan::state::swapchain::Swapchain;
use crate::render::backends::vulkan::{VulkanContext, VulkanResult};
use crate::scene::geometry::{surface_grid, MeshRange, SceneGeometry};
use crate::scene::{water_scene, CapturePass, ObjectKind, ObjectTexture, PassKind, SceneObject, SceneRanges};

/// Quads per side of the water surface grid
pub const WATER_GRID_DIVISIONS: u32 = 128;

const CLEAR_VALUES: [vk::ClearValue; 2] = [
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: [0.0, 0.0, 0.0, 1.0],
        },
    },
    vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    },
];

/// Water set bindings: UBO, refraction, reflection, height field
///
/// The height field is read by the vertex stage as well, so the graphics
/// submission must wait for the simulation there too.
pub fn water_bindings() -> [(vk::DescriptorType, vk::ShaderStageFlags); 4] {
    use vk::DescriptorType as T;
    use vk::ShaderStageFlags as S;

    [
        (T::UNIFORM_BUFFER, S::VERTEX | S::FRAGMENT),
        (T::COMBINED_IMAGE_SAMPLER, S::FRAGMENT),
        (T::COMBINED_IMAGE_SAMPLER, S::FRAGMENT),
        (T::COMBINED_IMAGE_SAMPLER, S::VERTEX | S::FRAGMENT),
    ]
}

/// Geometry and textures shared by every pass
pub struct SceneAssets {
    /// Every mesh's vertices
    pub vertex_buffer: Buffer,
    /// Every mesh's indices, local to each mesh
    pub index_buffer: Buffer,
    skybox: CubeMap,
    chalet: Texture,
    lake: Texture,
    /// Optional seed for the simulation images
    pub heightmap: Option<RgbaImage>,
    /// Textured objects in draw order
    pub objects: Vec<SceneObject>,
    /// Water surface grid
    pub water: MeshRange,
}

impl SceneAssets {
    /// Load models and textures and upload them
    pub fn load(context: &VulkanContext, config: &SceneConfig) -> AppResult<Self> {
        let mut geometry = SceneGeometry::new();
        let ranges = SceneRanges {
            skybox: geometry.add(&load_obj(&config.skybox_model)?),
            chalet: geometry.add(&load_obj(&config.chalet_model)?),
            lake: geometry.add(&load_obj(&config.lake_model)?),
        };
        let water = geometry.add(&surface_grid(WATER_GRID_DIVISIONS));

        let vertex_buffer = Buffer::vertex_buffer(context, geometry.vertices())?;
        let index_buffer = Buffer::index_buffer(context, geometry.indices())?;

        let skybox = CubeMap::from_faces(context, &load_cube_faces(&config.skybox_dir)?)?;
        let chalet = Texture::from_image(context, &load_rgba(&config.chalet_texture)?)?;
        let lake = Texture::from_image(context, &load_rgba(&config.lake_texture)?)?;
        let heightmap = config.heightmap.as_ref().map(load_rgba).transpose()?;

        log::info!(
            "Scene loaded: {} vertices, {} indices{}",
            geometry.vertices().len(),
            geometry.indices().len(),
            if heightmap.is_some() { ", seeded height field" } else { "" }
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            skybox,
            chalet,
            lake,
            heightmap,
            objects: water_scene(&ranges),
            water,
        })
    }

    /// Texture bound for `texture`
    pub fn texture(&self, texture: ObjectTexture) -> &dyn Sampled {
        match texture {
            ObjectTexture::Skybox => &self.skybox,
            ObjectTexture::Chalet => &self.chalet,
            ObjectTexture::Lake => &self.lake,
        }
    }
}

/// Registry meshes of one pass
#[derive(Debug, Clone)]
pub struct PassMeshes {
    /// Pass parameters
    pub pass: CapturePass,
    /// `(object index, mesh)` for every object the pass draws
    pub objects: Vec<(usize, MeshId)>,
}

/// Everything declared in the descriptor registry
#[derive(Debug, Clone)]
pub struct SceneLayout {
    /// Object set layout: UBO, texture
    pub object_layout: LayoutId,
    /// Water set layout: UBO, refraction, reflection, height field
    pub water_layout: LayoutId,
    /// Simulation set layout: ping, pong, input
    pub compute_layout: LayoutId,
    /// Objects, with the clip plane push constant
    pub object_pipe: PipeLayoutId,
    /// Water surface
    pub water_pipe: PipeLayoutId,
    /// Simulation
    pub compute_pipe: PipeLayoutId,
    /// Refraction, reflection, surface
    pub passes: Vec<PassMeshes>,
    /// Water surface mesh
    pub water: MeshId,
    /// Simulation entry; carries the input uniform
    pub simulation: MeshId,
}

impl SceneLayout {
    /// Declare layouts, pipeline layouts and one mesh per drawn object per pass
    pub fn declare(registry: &mut DescriptorRegistry, assets: &SceneAssets, water_height: f32) -> VulkanResult<Self> {
        use vk::DescriptorType as T;
        use vk::ShaderStageFlags as S;

        let object_layout = registry.add_layout(&[
            (T::UNIFORM_BUFFER, S::VERTEX | S::FRAGMENT),
            (T::COMBINED_IMAGE_SAMPLER, S::FRAGMENT),
        ])?;
        let water_layout = registry.add_layout(&water_bindings())?;
        let compute_layout = registry.add_layout(&[
            (T::STORAGE_IMAGE, S::COMPUTE),
            (T::STORAGE_IMAGE, S::COMPUTE),
            (T::UNIFORM_BUFFER, S::COMPUTE),
        ])?;

        let object_pipe = registry.add_pipe_layout(&[object_layout], &[ClipPlane::range(S::FRAGMENT)])?;
        let water_pipe = registry.add_pipe_layout(&[water_layout], &[])?;
        let compute_pipe = registry.add_pipe_layout(&[compute_layout], &[])?;

        let passes = CapturePass::all(water_height)
            .into_iter()
            .map(|pass| {
                let objects = assets
                    .objects
                    .iter()
                    .enumerate()
                    .filter(|(_, object)| !pass.reflected || object.reflected)
                    .map(|(index, object)| {
                        let desc = MeshDesc {
                            tag: format!("{}/{}", pass.name(), object.tag),
                            first_index: object.range.first_index,
                            index_count: object.range.index_count,
                            vertex_offset: object.range.vertex_offset,
                        };
                        (index, registry.add_mesh(desc, &[object_layout]))
                    })
                    .collect();
                PassMeshes { pass, objects }
            })
            .collect();

        let water = registry.add_mesh(
            MeshDesc {
                tag: "surface/water".to_string(),
                first_index: assets.water.first_index,
                index_count: assets.water.index_count,
                vertex_offset: assets.water.vertex_offset,
            },
            &[water_layout],
        );
        let simulation = registry.add_mesh(MeshDesc::compute("simulation"), &[compute_layout]);

        Ok(Self {
            object_layout,
            water_layout,
            compute_layout,
            object_pipe,
            water_pipe,
            compute_pipe,
            passes,
            water,
            simulation,
        })
    }
}

/// A pass's render target and the pipelines recorded into it
pub struct PassTarget {
    /// Pass parameters
    pub pass: CapturePass,
    /// Framebuffers, command buffers, pipelines
    pub target: RenderTarget,
    skybox_pipeline: usize,
    object_pipeline: usize,
    water_pipeline: Option<usize>,
}

/// Fixed-function state for objects drawn in `pass`
///
/// The camera's half-turn roll flips screen-space winding, so upright
/// geometry culls front faces; the mirror flips it back.
pub fn object_pipeline_options(kind: ObjectKind, pass: &CapturePass) -> PipelineOptions {
    let options = match kind {
        ObjectKind::Skybox => PipelineOptions {
            depth_test: false,
            cull_mode: vk::CullModeFlags::BACK,
        },
        ObjectKind::Model => PipelineOptions {
            depth_test: true,
            cull_mode: vk::CullModeFlags::FRONT,
        },
    };
    if pass.reflected {
        options.mirrored()
    } else {
        options
    }
}

/// The swapchain and everything sized by its image count
///
/// Fields drop in reverse dependency order: the surface target's framebuffers
/// reference swapchain views.
pub struct SwapchainResources {
    /// Refraction, reflection and surface targets in submission order
    pub targets: Vec<PassTarget>,
    /// Height-field simulation
    pub compute: ComputeStage,
    /// Presentable images
    pub swapchain: Swapchain,
}

impl SwapchainResources {
    /// Build, bind and record everything for a swapchain of `extent`
    ///
    /// The registry's pool must be free; it is allocated here for the new
    /// image count.
    pub fn build(
        context: &VulkanContext,
        config: &ApplicationConfig,
        extent: vk::Extent2D,
        assets: &SceneAssets,
        layout: &SceneLayout,
        registry: &mut DescriptorRegistry,
    ) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(context, extent)?;
        let image_count = swapchain.size();

        registry.allocate(context, image_count, UniformBufferObject::SIZE)?;

        let (sim_width, sim_height) = config.scene.simulation_extent;
        let mut compute = ComputeStage::new(
            context,
            "simulation",
            image_count,
            vk::Extent2D {
                width: sim_width,
                height: sim_height,
            },
            assets.heightmap.as_ref(),
        )?;
        let compute_pipeline = compute.add_pipeline(
            registry.pipe_layout(layout.compute_pipe),
            Path::new(&config.renderer.shaders.simulation_compute),
        )?;

        let capture = capture_extent(config.scene.capture_size, swapchain.extent());
        let targets = layout
            .passes
            .iter()
            .map(|meshes| build_target(context, config, &swapchain, capture, meshes.pass, layout, registry))
            .collect::<VulkanResult<Vec<_>>>()?;

        let resources = Self {
            targets,
            compute,
            swapchain,
        };
        resources.bind_descriptors(context.device(), assets, layout, registry);
        resources.record(context.device(), assets, layout, registry, compute_pipeline)?;

        log::debug!(
            "Swapchain resources built: {} images, captures at {}x{}",
            image_count,
            capture.width,
            capture.height
        );
        Ok(resources)
    }

    fn target(&self, kind: PassKind) -> &RenderTarget {
        &self
            .targets
            .iter()
            .find(|t| t.pass.kind == kind)
            .unwrap_or_else(|| panic!("no {:?} pass target", kind))
            .target
    }

    /// Point every descriptor set at its uniform buffer and images
    fn bind_descriptors(&self, device: &Device, assets: &SceneAssets, layout: &SceneLayout, registry: &DescriptorRegistry) {
        let refraction = self.target(PassKind::Refraction);
        let reflection = self.target(PassKind::Reflection);

        for i in 0..self.swapchain.size() {
            let mut writer = DescriptorSetWriter::new();

            for meshes in &layout.passes {
                for &(index, mesh) in &meshes.objects {
                    let texture = assets.texture(assets.objects[index].texture);
                    let set = registry.get_descriptor(mesh, i, 0);
                    writer = writer
                        .uniform_buffer(set, 0, registry.get_uni_buffer(mesh, i, 0))
                        .sampled_image(set, 1, texture.view(), texture.sampler());
                }
            }

            let water = registry.get_descriptor(layout.water, i, 0);
            writer = writer
                .uniform_buffer(water, 0, registry.get_uni_buffer(layout.water, i, 0))
                .sampled_image(water, 1, refraction.color_view(i), refraction.color_sampler(i))
                .sampled_image(water, 2, reflection.color_view(i), reflection.color_sampler(i))
                .sampled_image_in(
                    water,
                    3,
                    self.compute.view(ImageRole::Display, i),
                    self.compute.sampler(ImageRole::Display, i),
                    vk::ImageLayout::GENERAL,
                );

            let simulation = registry.get_descriptor(layout.simulation, i, 0);
            writer = writer
                .storage_image(simulation, 0, self.compute.view(ImageRole::Ping, i))
                .storage_image(simulation, 1, self.compute.view(ImageRole::Pong, i))
                .uniform_buffer(simulation, 2, registry.get_uni_buffer(layout.simulation, i, 0));

            writer.update(device);
        }
    }

    /// Record the compute and every pass's command buffers
    fn record(
        &self,
        device: &Device,
        assets: &SceneAssets,
        layout: &SceneLayout,
        registry: &DescriptorRegistry,
        compute_pipeline: usize,
    ) -> VulkanResult<()> {
        self.compute
            .record(registry, layout.simulation, layout.compute_pipe, compute_pipeline)?;

        for (pass_target, meshes) in self.targets.iter().zip(&layout.passes) {
            record_pass(device, pass_target, meshes, assets, layout, registry)?;
        }
        Ok(())
    }
}

fn build_target(
    context: &VulkanContext,
    config: &ApplicationConfig,
    swapchain: &Swapchain,
    capture: vk::Extent2D,
    pass: CapturePass,
    layout: &SceneLayout,
    registry: &DescriptorRegistry,
) -> VulkanResult<PassTarget> {
    let shaders = &config.renderer.shaders;
    let mut target = RenderTarget::new(context, pass.name(), pass.layouts, swapchain)?;
    if pass.is_capture() {
        target.init_fbo(context, swapchain, capture.width, capture.height)?;
    } else {
        target.set_to_default_fbo(swapchain)?;
    }

    let object_pipe = registry.pipe_layout(layout.object_pipe);
    let skybox_pipeline = target.add_pipeline_with(
        object_pipe,
        Path::new(&shaders.skybox_vertex),
        Path::new(&shaders.skybox_fragment),
        object_pipeline_options(ObjectKind::Skybox, &pass),
    )?;
    let object_pipeline = target.add_pipeline_with(
        object_pipe,
        Path::new(&shaders.object_vertex),
        Path::new(&shaders.object_fragment),
        object_pipeline_options(ObjectKind::Model, &pass),
    )?;
    let water_pipeline = if pass.is_capture() {
        None
    } else {
        Some(target.add_pipeline_with(
            registry.pipe_layout(layout.water_pipe),
            Path::new(&shaders.water_vertex),
            Path::new(&shaders.water_fragment),
            PipelineOptions::default().culling(vk::CullModeFlags::NONE),
        )?)
    };

    Ok(PassTarget {
        pass,
        target,
        skybox_pipeline,
        object_pipeline,
        water_pipeline,
    })
}

fn record_pass(
    device: &Device,
    pass_target: &PassTarget,
    meshes: &PassMeshes,
    assets: &SceneAssets,
    layout: &SceneLayout,
    registry: &DescriptorRegistry,
) -> VulkanResult<()> {
    let target = &pass_target.target;
    let object_pipe = registry.pipe_layout(layout.object_pipe);

    for (i, &command_buffer) in target.command_buffers().iter().enumerate() {
        let cmd = CommandRecorder::new(device, command_buffer);
        cmd.begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)?;
        {
            let pass = cmd.begin_render_pass(target.render_pass(), target.framebuffer(i), target.extent(), &CLEAR_VALUES);
            pass.bind_vertex_buffers(0, &[assets.vertex_buffer.handle()], &[0]);
            pass.bind_index_buffer(assets.index_buffer.handle());
            pass.push_constants(object_pipe, vk::ShaderStageFlags::FRAGMENT, bytemuck::bytes_of(&pass_target.pass.clip));

            for &(index, mesh) in &meshes.objects {
                let pipeline = match assets.objects[index].kind {
                    ObjectKind::Skybox => pass_target.skybox_pipeline,
                    ObjectKind::Model => pass_target.object_pipeline,
                };
                pass.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, target.pipeline(pipeline));
                registry.bind_descriptors(&pass, vk::PipelineBindPoint::GRAPHICS, mesh, i, layout.object_pipe);
                let desc = &registry.mesh(mesh).desc;
                pass.draw_indexed(desc.index_count, desc.first_index, desc.vertex_offset);
            }

            if let Some(water_pipeline) = pass_target.water_pipeline {
                pass.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, target.pipeline(water_pipeline));
                registry.bind_descriptors(&pass, vk::PipelineBindPoint::GRAPHICS, layout.water, i, layout.water_pipe);
                let desc = &registry.mesh(layout.water).desc;
                pass.draw_indexed(desc.index_count, desc.first_index, desc.vertex_offset);
            }
        }
        cmd.end()?;
    }

    log::trace!("Recorded {} pass for {} images", pass_target.pass.name(), target.command_buffers().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::frame::graphics_wait_stages;
    use crate::render::backends::vulkan::rendering::commands::layout_transition;

    /// Pipeline stage a sampling shader stage runs in
    fn pipeline_stages(stages: vk::ShaderStageFlags) -> vk::PipelineStageFlags {
        let mut out = vk::PipelineStageFlags::empty();
        if stages.contains(vk::ShaderStageFlags::VERTEX) {
            out |= vk::PipelineStageFlags::VERTEX_SHADER;
        }
        if stages.contains(vk::ShaderStageFlags::FRAGMENT) {
            out |= vk::PipelineStageFlags::FRAGMENT_SHADER;
        }
        out
    }

    #[test]
    fn test_graphics_waits_for_simulation_at_every_sampling_stage() {
        let sampled = water_bindings()
            .into_iter()
            .filter(|(ty, _)| *ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .fold(vk::PipelineStageFlags::empty(), |acc, (_, stages)| acc | pipeline_stages(stages));

        assert!(sampled.contains(vk::PipelineStageFlags::VERTEX_SHADER));
        assert!(graphics_wait_stages().contains(sampled));

        // The display image hand-off back to GENERAL must also be visible there
        for transfer in [vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL] {
            let masks = layout_transition(transfer, vk::ImageLayout::GENERAL).expect("hand-off");
            assert!(masks.dst_stage.contains(sampled));
        }
    }

    #[test]
    fn test_upright_models_cull_front_faces() {
        let surface = CapturePass::surface();
        let options = object_pipeline_options(ObjectKind::Model, &surface);
        assert_eq!(options.cull_mode, vk::CullModeFlags::FRONT);
        assert!(options.depth_test);
    }

    #[test]
    fn test_reflection_swaps_culling() {
        let reflection = CapturePass::reflection(0.0);
        assert_eq!(
            object_pipeline_options(ObjectKind::Model, &reflection).cull_mode,
            vk::CullModeFlags::BACK
        );
        assert_eq!(
            object_pipeline_options(ObjectKind::Skybox, &reflection).cull_mode,
            vk::CullModeFlags::FRONT
        );
    }

    #[test]
    fn test_skybox_skips_depth() {
        for pass in CapturePass::all(0.0) {
            assert!(!object_pipeline_options(ObjectKind::Skybox, &pass).depth_test);
        }
    }

    #[test]
    fn test_clear_values_are_black_and_far() {
        let color = unsafe { CLEAR_VALUES[0].color.float32 };
        let depth = unsafe { CLEAR_VALUES[1].depth_stencil.depth };
        assert_eq!(color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(depth, 1.0);
    }
}
