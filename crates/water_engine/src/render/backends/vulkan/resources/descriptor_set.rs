//! Descriptor set layouts, pools, pipeline layouts and batched writes

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout with one descriptor per binding, bindings numbered in order
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
    types: Vec<vk::DescriptorType>,
}

impl DescriptorSetLayout {
    /// Create a layout where binding `i` is `bindings[i]`
    pub fn new(device: Device, bindings: &[(vk::DescriptorType, vk::ShaderStageFlags)]) -> VulkanResult<Self> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .enumerate()
            .map(|(i, &(ty, stages))| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(i as u32)
                    .descriptor_type(ty)
                    .descriptor_count(1)
                    .stage_flags(stages)
                    .build()
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&vk_bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(Self {
            device,
            layout,
            types: bindings.iter().map(|&(ty, _)| ty).collect(),
        })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Descriptor type of each binding
    pub fn types(&self) -> &[vk::DescriptorType] {
        &self.types
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Pipeline layout wrapper with RAII cleanup
pub struct PipelineLayout {
    device: Device,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Layout over `set_layouts` in set order
    pub fn new(
        device: Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> VulkanResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        let layout = unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, layout })
    }

    /// Layout handle
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Descriptor pool; sets allocated from it are freed with it
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool with exact per-type capacities
    pub fn new(device: Device, sizes: &[vk::DescriptorPoolSize], max_sets: u32) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        Ok(Self { device, pool })
    }

    /// Allocate one set per entry of `layouts`
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<Vec<vk::DescriptorSet>> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(VulkanError::Api)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum PendingWrite {
    Buffer {
        set: vk::DescriptorSet,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
}

/// Batches descriptor writes and applies them in one `vkUpdateDescriptorSets`
///
/// Buffer and image infos are stored by value; the `vk::WriteDescriptorSet`
/// array pointing into them is only built inside [`DescriptorSetWriter::update`].
#[derive(Default)]
pub struct DescriptorSetWriter {
    writes: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Whole-buffer uniform binding
    pub fn uniform_buffer(mut self, set: vk::DescriptorSet, binding: u32, buffer: &Buffer) -> Self {
        self.writes.push(PendingWrite::Buffer {
            set,
            binding,
            info: vk::DescriptorBufferInfo {
                buffer: buffer.handle(),
                offset: 0,
                range: buffer.size(),
            },
        });
        self
    }

    /// Combined image sampler read in `SHADER_READ_ONLY_OPTIMAL`
    pub fn sampled_image(
        self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        self.sampled_image_in(set, binding, view, sampler, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// Combined image sampler read in an explicit layout
    pub fn sampled_image_in(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> Self {
        self.writes.push(PendingWrite::Image {
            set,
            binding,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: layout,
            },
        });
        self
    }

    /// Storage image accessed in `GENERAL`
    pub fn storage_image(mut self, set: vk::DescriptorSet, binding: u32, view: vk::ImageView) -> Self {
        self.writes.push(PendingWrite::Image {
            set,
            binding,
            ty: vk::DescriptorType::STORAGE_IMAGE,
            info: vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::GENERAL,
            },
        });
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every queued write
    pub fn update(&self, device: &Device) {
        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|write| match write {
                PendingWrite::Buffer { set, binding, info } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build(),
                PendingWrite::Image { set, binding, ty, info } => vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(std::slice::from_ref(info))
                    .build(),
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_queues_in_order() {
        let set = vk::DescriptorSet::null();
        let writer = DescriptorSetWriter::new()
            .storage_image(set, 0, vk::ImageView::null())
            .sampled_image(set, 1, vk::ImageView::null(), vk::Sampler::null());
        assert_eq!(writer.len(), 2);
        assert!(matches!(
            writer.writes[0],
            PendingWrite::Image { ty: vk::DescriptorType::STORAGE_IMAGE, binding: 0, .. }
        ));
        assert!(matches!(
            writer.writes[1],
            PendingWrite::Image {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                info: vk::DescriptorImageInfo { image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, .. },
                ..
            }
        ));
    }
}
