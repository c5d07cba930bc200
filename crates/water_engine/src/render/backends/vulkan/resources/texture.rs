//! Vulkan texture management
//!
//! Sampled 2D textures and the skybox cube map, both uploaded once through a
//! staging buffer and left in `SHADER_READ_ONLY_OPTIMAL`.

use ash::vk;

use crate::assets::RgbaImage;
use crate::render::backends::vulkan::resources::buffer::Buffer;
use crate::render::backends::vulkan::resources::image::{Image, ImageDesc, ImageView, Sampler};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Anything a combined image sampler descriptor can point at
pub trait Sampled {
    /// View bound to the descriptor
    fn view(&self) -> vk::ImageView;
    /// Sampler bound to the descriptor
    fn sampler(&self) -> vk::Sampler;
}

/// Basic Vulkan texture with image, image view, and sampler
pub struct Texture {
    sampler: Sampler,
    view: ImageView,
    _image: Image,
}

impl Texture {
    /// Upload tightly packed RGBA8 pixels as an sRGB texture
    pub fn from_rgba(context: &VulkanContext, width: u32, height: u32, pixels: &[u8]) -> VulkanResult<Self> {
        let extent = vk::Extent2D { width, height };
        let image = upload(context, ImageDesc::new(extent, vk::Format::R8G8B8A8_SRGB, SAMPLED_DST), pixels)?;
        let view = image.create_view(vk::ImageAspectFlags::COLOR)?;
        let sampler = Sampler::new(context, vk::SamplerAddressMode::REPEAT)?;

        log::debug!("Uploaded {}x{} texture", width, height);
        Ok(Self { sampler, view, _image: image })
    }

    /// Upload a decoded image
    pub fn from_image(context: &VulkanContext, image: &RgbaImage) -> VulkanResult<Self> {
        Self::from_rgba(context, image.width, image.height, &image.pixels)
    }
}

impl Sampled for Texture {
    fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

/// Six-face cube texture for the skybox
pub struct CubeMap {
    sampler: Sampler,
    view: ImageView,
    _image: Image,
}

impl CubeMap {
    /// Faces in +X, −X, +Y, −Y, +Z, −Z order, all the same size
    pub fn from_faces(context: &VulkanContext, faces: &[RgbaImage; 6]) -> VulkanResult<Self> {
        let (width, height) = (faces[0].width, faces[0].height);
        if faces.iter().any(|face| face.width != width || face.height != height) {
            return Err(VulkanError::InvalidOperation {
                reason: "cube map faces differ in size".to_string(),
            });
        }

        let pixels: Vec<u8> = faces.iter().flat_map(|face| face.pixels.iter().copied()).collect();
        let extent = vk::Extent2D { width, height };
        let image = upload(context, ImageDesc::cube(extent, vk::Format::R8G8B8A8_SRGB, SAMPLED_DST), &pixels)?;
        let view = image.create_view(vk::ImageAspectFlags::COLOR)?;
        let sampler = Sampler::new(context, vk::SamplerAddressMode::CLAMP_TO_EDGE)?;

        log::debug!("Uploaded {}x{} cube map", width, height);
        Ok(Self { sampler, view, _image: image })
    }
}

impl Sampled for CubeMap {
    fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }
}

const SAMPLED_DST: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSFER_DST.as_raw() | vk::ImageUsageFlags::SAMPLED.as_raw(),
);

/// Staged upload ending in `SHADER_READ_ONLY_OPTIMAL`
fn upload(context: &VulkanContext, desc: ImageDesc, pixels: &[u8]) -> VulkanResult<Image> {
    let expected = desc.extent.width as usize * desc.extent.height as usize * 4 * desc.layer_count() as usize;
    if pixels.len() != expected {
        return Err(VulkanError::InvalidOperation {
            reason: format!("expected {} bytes of RGBA data, got {}", expected, pixels.len()),
        });
    }

    let staging = Buffer::host_visible(context, pixels.len() as vk::DeviceSize, vk::BufferUsageFlags::TRANSFER_SRC)?;
    staging.write(pixels)?;

    let image = Image::new(context, desc)?;
    let layers = desc.layer_count();
    context.graphics_pool().single_time(context.graphics_queue(), |cmd| {
        cmd.transition_image_layout(
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            layers,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        cmd.copy_buffer_to_image(staging.handle(), image.handle(), desc.extent, layers);
        cmd.transition_image_layout(
            image.handle(),
            vk::ImageAspectFlags::COLOR,
            layers,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    })?;

    Ok(image)
}
