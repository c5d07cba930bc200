//! Vertex input layout shared by every graphics pipeline

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::scene::geometry::Vertex;

/// Binding and attribute descriptions for [`Vertex`]
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Single interleaved binding at index 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..3: position, texture coordinate, normal
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, normal) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_are_packed_in_order() {
        let attrs = VulkanVertexLayout::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 20]);
        assert_eq!(VulkanVertexLayout::binding_description().stride, 32);
    }
}
