//! # Descriptor and Pipeline Registry
//!
//! Central table of descriptor set layouts, pipeline layouts and meshes, plus
//! the per-swapchain-image descriptor sets and uniform buffers allocated for
//! them.
//!
//! ## Lifecycle
//! ```text
//! add_layout* → add_pipe_layout* → add_mesh* → allocate → (ready) → free_pool → allocate → …
//! ```
//! Layouts, pipeline layouts and meshes live as long as the registry. The
//! pool, the sets and the uniform buffers are sized by the swapchain image
//! count and are rebuilt on every swapchain recreate.
//!
//! ## Slot model
//! Declaring a mesh hands it the next run of descriptor slots (one per set it
//! uses) and the next run of uniform slots (one per `UNIFORM_BUFFER` binding
//! across those sets). Both runs are the same in every frame, so a mesh's data
//! for image `i` lives at `[i][range.start + idx]`.
//!
//! The bookkeeping is kept in [`DescriptorPlan`], which needs no device.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::backends::vulkan::rendering::commands::CommandRecorder;
use crate::render::backends::vulkan::resources::arena::{FrameArena, SlotRange};
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::descriptor_set::{
    DescriptorPool, DescriptorSetLayout, PipelineLayout,
};
use crate::render::backends::vulkan::{VulkanContext, VulkanResult};

/// Slots a mesh received when it was declared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshAllocation {
    /// Descriptor sets, one per declared set layout
    pub descriptor: SlotRange,
    /// Uniform buffers, one per uniform binding across those sets
    pub uniform: SlotRange,
}

/// Device-free descriptor bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorPlan {
    layouts: Vec<Vec<vk::DescriptorType>>,
    type_counts: Vec<(vk::DescriptorType, u32)>,
    descriptor_layouts: Vec<usize>,
    uni_index: usize,
}

impl DescriptorPlan {
    /// Empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a set layout's binding types; returns its index
    pub fn add_layout(&mut self, types: Vec<vk::DescriptorType>) -> usize {
        self.layouts.push(types);
        self.layouts.len() - 1
    }

    /// Assign slots to a mesh using the given layouts in set order
    ///
    /// # Panics
    /// When a layout index was never declared.
    pub fn add_mesh(&mut self, set_layouts: &[usize]) -> MeshAllocation {
        let descriptor = SlotRange::new(self.descriptor_layouts.len(), set_layouts.len());
        let uniform_start = self.uni_index;

        for &layout in set_layouts {
            let types = self
                .layouts
                .get(layout)
                .unwrap_or_else(|| panic!("unknown descriptor set layout {}", layout));

            for &ty in types {
                match self.type_counts.iter_mut().find(|(t, _)| *t == ty) {
                    Some((_, count)) => *count += 1,
                    None => self.type_counts.push((ty, 1)),
                }
                if ty == vk::DescriptorType::UNIFORM_BUFFER {
                    self.uni_index += 1;
                }
            }
            self.descriptor_layouts.push(layout);
        }

        MeshAllocation {
            descriptor,
            uniform: SlotRange::new(uniform_start, self.uni_index - uniform_start),
        }
    }

    /// Pool capacity per type for `image_count` copies of every mesh's sets
    pub fn pool_sizes(&self, image_count: usize) -> Vec<vk::DescriptorPoolSize> {
        self.type_counts
            .iter()
            .map(|&(ty, count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count: count * image_count as u32,
            })
            .collect()
    }

    /// Maximum sets the pool must hold
    pub fn max_sets(&self, image_count: usize) -> u32 {
        (image_count * self.descriptor_layouts.len()) as u32
    }

    /// Layout index of every descriptor slot
    pub fn descriptor_layouts(&self) -> &[usize] {
        &self.descriptor_layouts
    }

    /// Uniform slots per frame
    pub fn uniform_slots(&self) -> usize {
        self.uni_index
    }

    /// Bindings declared for layout `index`
    pub fn layout_types(&self, index: usize) -> &[vk::DescriptorType] {
        &self.layouts[index]
    }
}

/// Index of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(pub usize);

/// Index of a pipeline layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeLayoutId(pub usize);

/// Index of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

/// Draw range of a mesh inside the shared vertex and index buffers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshDesc {
    /// Name used in panics and logs
    pub tag: String,
    /// First index in the shared index buffer
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Added to every index
    pub vertex_offset: i32,
}

impl MeshDesc {
    /// A mesh with no geometry, used for compute-only entries
    pub fn compute(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            first_index: 0,
            index_count: 0,
            vertex_offset: 0,
        }
    }
}

/// A declared mesh and its slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mesh {
    /// Geometry range
    pub desc: MeshDesc,
    /// Descriptor and uniform slots
    pub allocation: MeshAllocation,
}

struct Allocation {
    uniforms: FrameArena<Buffer>,
    sets: FrameArena<vk::DescriptorSet>,
    // Freeing the pool frees the sets
    _pool: DescriptorPool,
}

/// Registry of layouts, meshes and their per-image descriptor sets
pub struct DescriptorRegistry {
    device: Device,
    allocation: Option<Allocation>,
    meshes: Vec<Mesh>,
    plan: DescriptorPlan,
    pipe_layouts: Vec<PipelineLayout>,
    layouts: Vec<DescriptorSetLayout>,
}

impl DescriptorRegistry {
    /// Empty registry
    pub fn new(context: &VulkanContext) -> Self {
        Self {
            device: context.raw_device(),
            allocation: None,
            meshes: Vec::new(),
            plan: DescriptorPlan::new(),
            pipe_layouts: Vec::new(),
            layouts: Vec::new(),
        }
    }

    /// Declare a descriptor set layout; binding `i` is `bindings[i]`
    pub fn add_layout(&mut self, bindings: &[(vk::DescriptorType, vk::ShaderStageFlags)]) -> VulkanResult<LayoutId> {
        let layout = DescriptorSetLayout::new(self.device.clone(), bindings)?;
        let index = self.plan.add_layout(layout.types().to_vec());
        self.layouts.push(layout);
        Ok(LayoutId(index))
    }

    /// Declare a pipeline layout over set layouts in set order
    pub fn add_pipe_layout(
        &mut self,
        set_layouts: &[LayoutId],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<PipeLayoutId> {
        let handles: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|&id| self.layout(id)).collect();
        self.pipe_layouts
            .push(PipelineLayout::new(self.device.clone(), &handles, push_constants)?);
        Ok(PipeLayoutId(self.pipe_layouts.len() - 1))
    }

    /// Declare a mesh using `set_layouts` as sets `0..n`
    ///
    /// # Panics
    /// When the registry is allocated; call [`Self::free_pool`] first.
    pub fn add_mesh(&mut self, desc: MeshDesc, set_layouts: &[LayoutId]) -> MeshId {
        assert!(
            self.allocation.is_none(),
            "mesh '{}' declared after allocate; free the pool first",
            desc.tag
        );
        let indices: Vec<usize> = set_layouts.iter().map(|id| id.0).collect();
        let allocation = self.plan.add_mesh(&indices);
        log::trace!(
            "Mesh '{}': descriptors {:?}, uniforms {:?}",
            desc.tag,
            allocation.descriptor,
            allocation.uniform
        );
        self.meshes.push(Mesh { desc, allocation });
        MeshId(self.meshes.len() - 1)
    }

    /// Create the pool, the sets and `uniform_size`-byte uniform buffers for `image_count` images
    pub fn allocate(&mut self, context: &VulkanContext, image_count: usize, uniform_size: vk::DeviceSize) -> VulkanResult<()> {
        self.free_pool();

        let sizes = self.plan.pool_sizes(image_count);
        let max_sets = self.plan.max_sets(image_count);
        log::debug!(
            "Descriptor pool: {} sets over {} images, sizes {:?}",
            max_sets,
            image_count,
            sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect::<Vec<_>>()
        );

        let pool = DescriptorPool::new(self.device.clone(), &sizes, max_sets.max(1))?;
        let slot_layouts: Vec<vk::DescriptorSetLayout> = self
            .plan
            .descriptor_layouts()
            .iter()
            .map(|&i| self.layouts[i].handle())
            .collect();

        let rows = (0..image_count)
            .map(|_| pool.allocate(&slot_layouts))
            .collect::<VulkanResult<Vec<_>>>()?;
        let sets = FrameArena::from_rows(rows, slot_layouts.len());

        let uniforms = FrameArena::try_build(image_count, self.plan.uniform_slots(), |_, _| {
            Buffer::host_visible(context, uniform_size, vk::BufferUsageFlags::UNIFORM_BUFFER)
        })?;

        self.allocation = Some(Allocation {
            uniforms,
            sets,
            _pool: pool,
        });
        Ok(())
    }

    /// Destroy the pool, its sets and the uniform buffers; declarations are kept
    pub fn free_pool(&mut self) {
        if self.allocation.take().is_some() {
            log::debug!("Descriptor pool freed");
        }
    }

    /// Whether [`Self::allocate`] has run since the last free
    pub fn is_allocated(&self) -> bool {
        self.allocation.is_some()
    }

    fn allocated(&self, mesh: MeshId) -> &Allocation {
        self.allocation
            .as_ref()
            .unwrap_or_else(|| panic!("mesh '{}' used before the registry was allocated", self.mesh(mesh).desc.tag))
    }

    /// Descriptor set `idx` of `mesh` for swapchain image `frame`
    ///
    /// # Panics
    /// When `idx` is outside the mesh's descriptor range or not allocated.
    pub fn get_descriptor(&self, mesh: MeshId, frame: usize, idx: usize) -> vk::DescriptorSet {
        let range = self.mesh(mesh).allocation.descriptor;
        assert!(
            idx < range.size,
            "mesh '{}' has {} descriptor sets, asked for {}",
            self.mesh(mesh).desc.tag,
            range.size,
            idx
        );
        *self.allocated(mesh).sets.get(frame, range, idx)
    }

    /// Uniform buffer `idx` of `mesh` for swapchain image `frame`
    ///
    /// # Panics
    /// When `idx` is outside the mesh's uniform range or not allocated.
    pub fn get_uni_buffer(&self, mesh: MeshId, frame: usize, idx: usize) -> &Buffer {
        let range = self.mesh(mesh).allocation.uniform;
        assert!(
            idx < range.size,
            "mesh '{}' has {} uniform buffers, asked for {}",
            self.mesh(mesh).desc.tag,
            range.size,
            idx
        );
        self.allocated(mesh).uniforms.get(frame, range, idx)
    }

    /// Copy `value` into uniform buffer `idx` of `mesh` for `frame`
    pub fn write_uniform<T: Pod>(&self, mesh: MeshId, frame: usize, idx: usize, value: &T) -> VulkanResult<()> {
        self.get_uni_buffer(mesh, frame, idx).write(std::slice::from_ref(value))
    }

    /// Bind all of `mesh`'s sets starting at set 0
    pub fn bind_descriptors(
        &self,
        cmd: &CommandRecorder<'_>,
        bind_point: vk::PipelineBindPoint,
        mesh: MeshId,
        frame: usize,
        pipe_layout: PipeLayoutId,
    ) {
        let range = self.mesh(mesh).allocation.descriptor;
        let sets = self.allocated(mesh).sets.range(frame, range);
        cmd.bind_descriptor_sets(bind_point, self.pipe_layout(pipe_layout), 0, sets);
    }

    /// Bind set `idx` of `mesh` at `first_set`
    pub fn bind_descriptor(
        &self,
        cmd: &CommandRecorder<'_>,
        bind_point: vk::PipelineBindPoint,
        mesh: MeshId,
        frame: usize,
        idx: usize,
        first_set: u32,
        pipe_layout: PipeLayoutId,
    ) {
        let set = self.get_descriptor(mesh, frame, idx);
        cmd.bind_descriptor_sets(bind_point, self.pipe_layout(pipe_layout), first_set, &[set]);
    }

    /// Declared mesh
    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    /// All declared meshes in declaration order
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// Descriptor set layout handle
    pub fn layout(&self, id: LayoutId) -> vk::DescriptorSetLayout {
        self.layouts
            .get(id.0)
            .unwrap_or_else(|| panic!("unknown descriptor set layout {}", id.0))
            .handle()
    }

    /// Pipeline layout handle
    pub fn pipe_layout(&self, id: PipeLayoutId) -> vk::PipelineLayout {
        self.pipe_layouts
            .get(id.0)
            .unwrap_or_else(|| panic!("unknown pipeline layout {}", id.0))
            .handle()
    }

    /// Device-free bookkeeping
    pub fn plan(&self) -> &DescriptorPlan {
        &self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::DescriptorType as T;

    /// Set layouts each mesh of `scene_plan` is declared with, in set order
    fn scene_mesh_layouts() -> Vec<Vec<usize>> {
        let (object, water, compute) = (0, 1, 2);
        vec![vec![object], vec![object], vec![water], vec![compute], vec![object, water]]
    }

    /// Object, water and compute layouts as the water scene declares them
    fn scene_plan() -> (DescriptorPlan, Vec<MeshAllocation>) {
        let mut plan = DescriptorPlan::new();
        let object = plan.add_layout(vec![T::UNIFORM_BUFFER, T::COMBINED_IMAGE_SAMPLER]);
        let water = plan.add_layout(vec![
            T::UNIFORM_BUFFER,
            T::COMBINED_IMAGE_SAMPLER,
            T::COMBINED_IMAGE_SAMPLER,
            T::COMBINED_IMAGE_SAMPLER,
        ]);
        let compute = plan.add_layout(vec![T::STORAGE_IMAGE, T::STORAGE_IMAGE, T::UNIFORM_BUFFER]);

        assert_eq!((object, water, compute), (0, 1, 2));

        let allocations = scene_mesh_layouts()
            .iter()
            .map(|layouts| plan.add_mesh(layouts))
            .collect();
        (plan, allocations)
    }

    #[test]
    fn test_descriptor_slot_i_uses_the_ith_declared_layout() {
        let (plan, allocations) = scene_plan();

        for (alloc, set_layouts) in allocations.iter().zip(scene_mesh_layouts()) {
            assert_eq!(alloc.descriptor.size, set_layouts.len());
            for (i, &layout) in set_layouts.iter().enumerate() {
                assert_eq!(plan.descriptor_layouts()[alloc.descriptor.start + i], layout);
            }
        }

        // The two-set mesh keeps object before water
        assert_eq!(&plan.descriptor_layouts()[4..6], &[0, 1]);
    }

    #[test]
    fn test_descriptor_ranges_are_contiguous_and_disjoint() {
        let (plan, allocations) = scene_plan();

        let mut next = 0;
        for alloc in &allocations {
            assert_eq!(alloc.descriptor.start, next);
            next = alloc.descriptor.end();
        }
        assert_eq!(next, plan.descriptor_layouts().len());
        assert_eq!(allocations[4].descriptor, SlotRange::new(4, 2));
    }

    #[test]
    fn test_uniform_slots_follow_uniform_bindings() {
        let (plan, allocations) = scene_plan();

        let sizes: Vec<usize> = allocations.iter().map(|a| a.uniform.size).collect();
        assert_eq!(sizes, vec![1, 1, 1, 1, 2]);
        assert_eq!(allocations[3].uniform.start, 3);
        assert_eq!(plan.uniform_slots(), 6);

        // Arena holds exactly frames × uniform slots buffers
        let arena = FrameArena::try_build::<()>(3, plan.uniform_slots(), |_, _| Ok(())).expect("arena");
        assert_eq!(arena.frames() * arena.slots_per_frame(), 18);
    }

    #[test]
    fn test_pool_sizes_cover_every_set() {
        let (plan, _) = scene_plan();
        let image_count = 3;
        let sizes = plan.pool_sizes(image_count);

        let count = |ty| {
            sizes
                .iter()
                .find(|s| s.ty == ty)
                .map_or(0, |s| s.descriptor_count)
        };
        assert_eq!(count(T::UNIFORM_BUFFER), 6 * 3);
        // Samplers: 1 + 1 + 3 + 0 + (1 + 3)
        assert_eq!(count(T::COMBINED_IMAGE_SAMPLER), 9 * 3);
        assert_eq!(count(T::STORAGE_IMAGE), 2 * 3);
        assert_eq!(plan.max_sets(image_count), 6 * 3);
    }

    #[test]
    fn test_empty_mesh_gets_empty_ranges() {
        let mut plan = DescriptorPlan::new();
        let alloc = plan.add_mesh(&[]);
        assert_eq!(alloc, MeshAllocation::default());
        assert_eq!(plan.max_sets(4), 0);
    }

    #[test]
    #[should_panic(expected = "unknown descriptor set layout 2")]
    fn test_unknown_layout_panics() {
        let mut plan = DescriptorPlan::new();
        plan.add_layout(vec![T::UNIFORM_BUFFER]);
        plan.add_mesh(&[2]);
    }
}
