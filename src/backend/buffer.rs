// Buffer utilities
//
// Vertex data lives in a host-visible buffer allocated through the
// device's gpu-allocator instance. Explicit destroy instead of Drop so
// teardown order against the allocator stays visible at the call site.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl GpuBuffer {
    /// Create a host-visible buffer and copy `data` into it.
    pub fn with_data<T: Copy>(
        device: &VulkanDevice,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> RenderResult<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let mut allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: "gpu-buffer",
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| RenderError::InitializationFailed(format!("allocation failed: {e}")))?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        }?;

        let mapped = allocation.mapped_slice_mut().ok_or_else(|| {
            RenderError::InitializationFailed("allocation is not host-visible".into())
        })?;
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, size as usize)
        };
        mapped[..bytes.len()].copy_from_slice(bytes);

        Ok(Self {
            buffer,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            let _ = device.allocator.lock().free(allocation);
        }
        unsafe { device.device.destroy_buffer(self.buffer, None) };
        self.buffer = vk::Buffer::null();
    }
}
