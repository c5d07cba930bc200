//! Buffer management
//!
//! RAII buffer + memory pairs. Host-visible buffers are written with
//! [`Buffer::write`]; static geometry goes through a staging upload into
//! device-local memory.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::backends::vulkan::resources::memory;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Buffer wrapper with RAII cleanup
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match memory::allocate(&device, context.memory_properties(), requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let buffer = Self {
            device,
            buffer,
            memory,
            size,
        };
        unsafe {
            buffer
                .device
                .bind_buffer_memory(buffer.buffer, buffer.memory, 0)
                .map_err(VulkanError::Api)?;
        }
        Ok(buffer)
    }

    /// Host-visible, host-coherent buffer
    pub fn host_visible(context: &VulkanContext, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VulkanResult<Self> {
        Self::new(context, size, usage, HOST_VISIBLE)
    }

    /// Map, copy `data` to the start of the buffer, unmap
    pub fn write<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into a {} byte buffer", bytes.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Staged upload of `data` into a new device-local buffer
    ///
    /// Blocks on the graphics queue. Setup-time data only.
    pub fn device_local_with_data<T: Pod>(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> VulkanResult<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let staging = Self::host_visible(context, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write(data)?;

        let target = Self::new(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        context
            .graphics_pool()
            .single_time(context.graphics_queue(), |cmd| {
                cmd.copy_buffer(staging.handle(), target.handle(), size);
                Ok(())
            })?;

        Ok(target)
    }

    /// Device-local vertex buffer
    pub fn vertex_buffer<T: Pod>(context: &VulkanContext, vertices: &[T]) -> VulkanResult<Self> {
        Self::device_local_with_data(context, vk::BufferUsageFlags::VERTEX_BUFFER, vertices)
    }

    /// Device-local `u32` index buffer
    pub fn index_buffer(context: &VulkanContext, indices: &[u32]) -> VulkanResult<Self> {
        Self::device_local_with_data(context, vk::BufferUsageFlags::INDEX_BUFFER, indices)
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
