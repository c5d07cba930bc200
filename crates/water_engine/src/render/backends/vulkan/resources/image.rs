//! Images, image views and samplers
//!
//! Every handle here owns its Vulkan object and destroys it on drop. Views
//! and samplers never outlive the image they were made for because their
//! owners (textures, render targets, the compute stage) declare them first.

use ash::{vk, Device};

use crate::render::backends::vulkan::resources::memory;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Parameters for [`Image::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Size in texels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Six array layers with the cube-compatible flag
    pub cube: bool,
}

impl ImageDesc {
    /// Single-layer 2D image
    pub fn new(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            cube: false,
        }
    }

    /// Six-layer cube-compatible image
    pub fn cube(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            cube: true,
            ..Self::new(extent, format, usage)
        }
    }

    /// Array layer count implied by the description
    pub fn layer_count(&self) -> u32 {
        if self.cube {
            6
        } else {
            1
        }
    }
}

/// Device-local image with bound memory
pub struct Image {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    desc: ImageDesc,
}

impl Image {
    /// Create an optimally tiled, device-local image
    pub fn new(context: &VulkanContext, desc: ImageDesc) -> VulkanResult<Self> {
        let device = context.raw_device();
        let flags = if desc.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.layer_count())
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = match memory::allocate(
            &device,
            context.memory_properties(),
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let image = Self {
            device,
            image,
            memory,
            desc,
        };
        unsafe {
            image
                .device
                .bind_image_memory(image.image, image.memory, 0)
                .map_err(VulkanError::Api)?;
        }
        Ok(image)
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Creation parameters
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// View over the whole image, cube or 2D to match the description
    pub fn create_view(&self, aspect: vk::ImageAspectFlags) -> VulkanResult<ImageView> {
        let view_type = if self.desc.cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        create_image_view(&self.device, self.image, self.desc.format, aspect, self.desc.layer_count(), view_type)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Image view wrapper with RAII cleanup
pub struct ImageView {
    device: Device,
    view: vk::ImageView,
}

impl ImageView {
    /// View handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

/// Create a view over `layer_count` layers of `image`
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    layer_count: u32,
    view_type: vk::ImageViewType,
) -> VulkanResult<ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        });

    let view = unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api)? };
    Ok(ImageView {
        device: device.clone(),
        view,
    })
}

/// Sampler wrapper with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear sampler with one address mode on all axes
    pub fn new(context: &VulkanContext, address_mode: vk::SamplerAddressMode) -> VulkanResult<Self> {
        let device = context.raw_device();
        let anisotropy = context.max_anisotropy();

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe { device.create_sampler(&create_info, None).map_err(VulkanError::Api)? };
        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_description_has_six_layers() {
        let extent = vk::Extent2D { width: 64, height: 64 };
        let cube = ImageDesc::cube(extent, vk::Format::R8G8B8A8_SRGB, vk::ImageUsageFlags::SAMPLED);
        assert_eq!(cube.layer_count(), 6);
        assert_eq!(ImageDesc { cube: false, ..cube }.layer_count(), 1);
    }
}
