//! Swapchain management
//!
//! Owns the presentable images, one color view per image and one depth
//! image + view per image. Everything here is sized by the swapchain, so the
//! whole struct is dropped and rebuilt on recreate.
//!
//! Surface format, present mode, extent, image count and depth format are
//! chosen by pure functions so the selection rules can be tested without a
//! device.

use ash::vk;

use crate::render::backends::vulkan::resources::image::{create_image_view, Image, ImageDesc, ImageView};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Prefer `B8G8R8A8_SRGB` with the sRGB non-linear color space, else the first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or(VulkanError::NoSuitableFormat("surface format"))
}

/// Prefer `MAILBOX`, else `FIFO` which every device must support
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> VulkanResult<vk::PresentModeKHR> {
    if modes.is_empty() {
        return Err(VulkanError::NoSuitableFormat("present mode"));
    }
    Ok(modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO))
}

/// Surface-dictated extent, or the window size clamped to the surface limits
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// One more than the minimum, capped by the maximum when the surface has one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// First candidate whose optimal tiling supports depth attachments
pub fn choose_depth_format(format_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags) -> VulkanResult<vk::Format> {
    DEPTH_CANDIDATES
        .iter()
        .copied()
        .find(|&format| format_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT))
        .ok_or(VulkanError::NoSuitableFormat("depth format"))
}

/// Outcome of acquire or present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    /// Matches the surface
    Optimal,
    /// Still presentable but no longer matches the surface
    Suboptimal,
    /// Unusable; must be recreated before the next acquire
    OutOfDate,
}

/// Vulkan swapchain with per-image color and depth views
pub struct Swapchain {
    device: ash::Device,
    loader: ash::extensions::khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<ImageView>,
    depth_views: Vec<ImageView>,
    depth_images: Vec<Image>,
    format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    pub fn new(context: &VulkanContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let physical = context.physical_device().device;
        let surface = context.surface();
        let surface_loader = context.surface_loader();

        let (caps, formats, modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&modes)?;
        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);
        let depth_format = choose_depth_format(|f| context.format_features(f))?;

        let families = context.queue_families();
        let family_indices = [families.graphics, families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());
        create_info = if families.graphics != families.present {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = context.swapchain_loader().clone();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };

        let mut this = Self {
            device: context.raw_device(),
            loader,
            swapchain,
            images: Vec::new(),
            views: Vec::new(),
            depth_views: Vec::new(),
            depth_images: Vec::new(),
            format,
            depth_format,
            present_mode,
            extent,
        };

        this.images = unsafe {
            this.loader
                .get_swapchain_images(this.swapchain)
                .map_err(VulkanError::Api)?
        };
        for &image in &this.images {
            this.views.push(create_image_view(
                &this.device,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
                1,
                vk::ImageViewType::TYPE_2D,
            )?);

            let depth = Image::new(
                context,
                ImageDesc::new(extent, depth_format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
            )?;
            this.depth_views.push(depth.create_view(vk::ImageAspectFlags::DEPTH)?);
            this.depth_images.push(depth);
        }

        log::debug!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images, depth {:?}",
            extent.width,
            extent.height,
            format.format,
            present_mode,
            this.images.len(),
            depth_format
        );

        Ok(this)
    }

    /// Number of presentable images
    pub fn size(&self) -> usize {
        self.images.len()
    }

    /// Image width in pixels
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    /// Image height in pixels
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color format of the presentable images
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Format chosen for depth attachments
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Selected present mode
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Presentable image `i`
    pub fn image(&self, i: usize) -> vk::Image {
        self.images[i]
    }

    /// Color view of image `i`
    pub fn view(&self, i: usize) -> vk::ImageView {
        self.views[i].handle()
    }

    /// Depth view paired with image `i`
    pub fn depth_view(&self, i: usize) -> vk::ImageView {
        self.depth_views[i].handle()
    }

    /// Raw swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<(u32, SwapchainStatus)> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok((index, SwapchainStatus::Optimal)),
            Ok((index, true)) => Ok((index, SwapchainStatus::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, SwapchainStatus::OutOfDate)),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Present image `index` once `wait` is signaled
    pub fn present(&self, queue: vk::Queue, index: u32, wait: vk::Semaphore) -> VulkanResult<SwapchainStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(SwapchainStatus::Optimal),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Views and depth images go before the swapchain that owns the images
        self.depth_views.clear();
        self.depth_images.clear();
        self.views.clear();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_srgb_bgra() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            surface_format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).ok(), Some(formats[1]));
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [surface_format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats).ok(), Some(formats[0]));
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_preference() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes).ok(), Some(vk::PresentModeKHR::MAILBOX));
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]).ok(),
            Some(vk::PresentModeKHR::FIFO)
        );
        assert!(choose_present_mode(&[]).is_err());
    }

    #[test]
    fn test_image_count() {
        assert_eq!(choose_image_count(&caps((800, 600), 2, 0)), 3);
        assert_eq!(choose_image_count(&caps((800, 600), 2, 2)), 2);
        assert_eq!(choose_image_count(&caps((800, 600), 2, 8)), 3);
    }

    #[test]
    fn test_resize_sequence_follows_window_when_surface_defers() {
        let caps = caps((u32::MAX, u32::MAX), 2, 0);
        let sizes = [(1280, 768), (640, 480), (1280, 768)];

        let extents: Vec<(u32, u32)> = sizes
            .iter()
            .map(|&(width, height)| {
                let e = choose_extent(&caps, vk::Extent2D { width, height });
                (e.width, e.height)
            })
            .collect();

        assert_eq!(extents, sizes.to_vec());
    }

    #[test]
    fn test_surface_extent_wins_when_defined() {
        let caps = caps((640, 480), 2, 0);
        let extent = choose_extent(&caps, vk::Extent2D { width: 1280, height: 768 });
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_window_is_clamped_to_surface_limits() {
        let caps = caps((u32::MAX, u32::MAX), 2, 0);
        let extent = choose_extent(&caps, vk::Extent2D { width: 0, height: 9000 });
        assert_eq!((extent.width, extent.height), (1, 4096));
    }

    #[test]
    fn test_depth_format_preference_order() {
        let only_d24 = |f: vk::Format| {
            if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            }
        };
        assert_eq!(choose_depth_format(only_d24).ok(), Some(vk::Format::D24_UNORM_S8_UINT));

        let all = |_| vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        assert_eq!(choose_depth_format(all).ok(), Some(vk::Format::D32_SFLOAT));

        assert!(choose_depth_format(|_| vk::FormatFeatureFlags::empty()).is_err());
    }
}
