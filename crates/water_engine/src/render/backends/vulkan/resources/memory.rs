//! Device memory type selection and allocation

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// First memory type allowed by `type_bits` whose flags contain `flags`
///
/// There is no fallback: a miss is fatal for the caller.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..props.memory_type_count)
        .find(|&i| type_bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(flags))
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate memory satisfying `requirements` with `flags`
pub(crate) fn allocate(
    device: &Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type = find_memory_type(props, requirements.memory_type_bits, flags)?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type);

    unsafe { device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn test_picks_first_type_that_is_a_superset() {
        let props = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, HOST, HOST | vk::MemoryPropertyFlags::HOST_CACHED]);

        assert_eq!(find_memory_type(&props, 0b111, HOST).ok(), Some(1));
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::HOST_CACHED).ok(),
            Some(2)
        );
    }

    #[test]
    fn test_respects_type_bits() {
        let props = props(&[HOST, HOST]);
        assert_eq!(find_memory_type(&props, 0b10, HOST).ok(), Some(1));
    }

    #[test]
    fn test_no_match_is_an_error() {
        let props = props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            find_memory_type(&props, 0b1, HOST),
            Err(VulkanError::NoSuitableMemoryType)
        ));
        // Matching flags but excluded by the requirement mask
        let props = self::props(&[HOST]);
        assert!(find_memory_type(&props, 0b10, HOST).is_err());
    }
}
