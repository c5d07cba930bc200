//! Vulkan context management
//!
//! One `VulkanContext` is built at startup and handed by reference to every
//! component that needs the instance, device, queues or command pools. It owns
//! only device-lifetime objects; everything sized by the swapchain lives
//! elsewhere and must be dropped before the context.

use ash::{Device, Entry, Instance};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::vk;
use std::collections::HashSet;
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::render::window::Window;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type satisfies the requested property flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// None of the candidate formats or present modes is supported
    #[error("No suitable {0} found")]
    NoSuitableFormat(&'static str),

    /// A layout transition outside the supported table was requested
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// A SPIR-V file could not be read or was malformed
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path that was requested
        path: String,
        /// What went wrong
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    #[cfg(debug_assertions)]
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance with GLFW's surface extensions, plus validation in debug builds
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let engine_name = CStr::from_bytes_with_nul(b"water_engine\0")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let extension_names = required_extensions
            .into_iter()
            .map(CString::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains NUL".to_string()))?;

        let validation = cfg!(debug_assertions) && enable_validation;

        #[allow(unused_mut)]
        let mut extensions: Vec<*const i8> = extension_names.iter().map(|e| e.as_ptr()).collect();
        #[cfg(debug_assertions)]
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<CString> = if validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation")
                .map_err(|_| VulkanError::InitializationFailed("Invalid layer name".to_string()))?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };
        log::debug!("Vulkan instance created (validation: {})", validation);

        #[cfg(debug_assertions)]
        let debug = if validation {
            let utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&utils)?;
            Some((utils, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let Some((utils, messenger)) = self.debug.take() {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation messages into `log`
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Queue family indices a device must expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics family
    pub graphics: u32,
    /// Presentation family
    pub present: u32,
    /// Compute family, always the graphics family
    pub compute: u32,
}

impl QueueFamilies {
    /// Pick families from `(flags, can_present)` per family index
    ///
    /// The simulation images are `EXCLUSIVE` and sampled by graphics without
    /// a queue family ownership transfer, and the compute barriers name
    /// graphics stages, so compute must run in the graphics family. Devices
    /// with no family that does both are rejected.
    pub fn select(families: &[(vk::QueueFlags, bool)]) -> Option<Self> {
        let graphics = families
            .iter()
            .position(|(flags, _)| flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))?;
        let present = families.iter().position(|&(_, present)| present)?;

        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
            compute: graphics as u32,
        })
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        [self.graphics, self.present, self.compute]
            .into_iter()
            .filter(|f| seen.insert(*f))
            .collect()
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Selected queue families
    pub families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    /// Select the first device that can draw, present, dispatch and has a swapchain
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", unsafe {
                        CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping physical device: {}", e),
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut described = Vec::with_capacity(queue_families.len());
        for (index, family) in queue_families.iter().enumerate() {
            let present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index as u32, surface)
                    .map_err(VulkanError::Api)?
            };
            described.push((family.queue_flags, present));
        }

        let families = QueueFamilies::select(&described).ok_or_else(|| {
            VulkanError::InitializationFailed("Missing graphics, present or compute queue family".to_string())
        })?;

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(VulkanError::InitializationFailed("VK_KHR_swapchain not supported".to_string()));
        }

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };
        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed("Surface reports no formats or present modes".to_string()));
        }

        Ok(Self {
            device,
            properties,
            features,
            families,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Compute dispatch queue
    pub compute_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per unique family
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let families = physical_device_info.families;
        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical_device_info.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let (graphics_queue, present_queue, compute_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
                device.get_device_queue(families.compute, 0),
            )
        };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            compute_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Explicit registry of the long-lived Vulkan handles
///
/// Fields drop top to bottom: the command pools go first, the logical device
/// after everything created from it, and the instance last. The surface is
/// destroyed in `Drop::drop`, which runs before any field.
pub struct VulkanContext {
    graphics_pool: CommandPool,
    compute_pool: CommandPool,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    physical_device: PhysicalDeviceInfo,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, enable_validation)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window
            .create_vulkan_surface(instance.instance.handle())
            .map_err(|e| VulkanError::InitializationFailed(format!("Surface creation: {}", e)))?;

        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader)?;
        let memory_properties =
            unsafe { instance.instance.get_physical_device_memory_properties(physical_device.device) };

        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let families = physical_device.families;
        log::debug!(
            "Queue families: graphics {}, present {}, compute {}",
            families.graphics,
            families.present,
            families.compute
        );

        let graphics_pool = CommandPool::new(device.device.clone(), families.graphics)?;
        let compute_pool = CommandPool::new(device.device.clone(), families.compute)?;

        Ok(Self {
            graphics_pool,
            compute_pool,
            surface,
            surface_loader,
            physical_device,
            memory_properties,
            device,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the surface loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Memory heaps and types of the selected device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Borrow the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Clone of the logical device handle table, for RAII wrappers
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the compute queue
    pub fn compute_queue(&self) -> vk::Queue {
        self.device.compute_queue
    }

    /// Selected queue families
    pub fn queue_families(&self) -> QueueFamilies {
        self.physical_device.families
    }

    /// Pool for graphics and transfer command buffers
    pub fn graphics_pool(&self) -> &CommandPool {
        &self.graphics_pool
    }

    /// Pool for compute command buffers
    pub fn compute_pool(&self) -> &CommandPool {
        &self.compute_pool
    }

    /// Maximum sampler anisotropy, `None` when the feature is off
    pub fn max_anisotropy(&self) -> Option<f32> {
        (self.physical_device.features.sampler_anisotropy == vk::TRUE)
            .then_some(self.physical_device.properties.limits.max_sampler_anisotropy)
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    /// Optimal-tiling format features, used when probing depth formats
    pub fn format_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical_device.device, format)
                .optimal_tiling_features
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    #[test]
    fn test_compute_shares_graphics_family_when_possible() {
        let families = QueueFamilies::select(&[(G | C | T, true), (C | T, false)]).expect("families");
        assert_eq!(families, QueueFamilies { graphics: 0, present: 0, compute: 0 });
        assert_eq!(families.unique(), vec![0]);
    }

    #[test]
    fn test_compute_never_leaves_graphics_family() {
        let families = QueueFamilies::select(&[(T, false), (G, true), (C, false), (G | C, false)]).expect("families");
        assert_eq!(families, QueueFamilies { graphics: 3, present: 1, compute: 3 });
        assert_eq!(families.unique(), vec![3, 1]);
    }

    #[test]
    fn test_device_without_graphics_compute_family_is_rejected() {
        assert!(QueueFamilies::select(&[(G, true), (C, false)]).is_none());
    }

    #[test]
    fn test_device_without_present_support_is_rejected() {
        assert!(QueueFamilies::select(&[(G | C, false)]).is_none());
    }
}
