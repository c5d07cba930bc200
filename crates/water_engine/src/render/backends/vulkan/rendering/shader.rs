//! SPIR-V shader modules

use ash::{vk, Device};
use std::ffi::CStr;
use std::path::Path;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Entry point every stage in this renderer uses
pub const ENTRY_POINT: &CStr = c"main";

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes
    pub fn from_bytes(device: &Device, bytes: &[u8], origin: &str) -> VulkanResult<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|e| VulkanError::ShaderLoad {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };

        log::trace!("Shader module {} created ({} words)", origin, code.len());
        Ok(Self {
            device: device.clone(),
            module,
        })
    }

    /// Load a compiled `.spv` file
    pub fn from_file(device: &Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(device, &bytes, &path.display().to_string())
    }

    /// Stage description using [`ENTRY_POINT`]
    pub fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_name() {
        assert_eq!(ENTRY_POINT.to_str(), Ok("main"));
    }
}
