/// VulkanBuffer - a `vk::Buffer` bound to a gpu-allocator allocation

use gpu_buffer_engine::gpubuf::{Error, Result};
use gpu_buffer_engine::gpubuf::device::{BufferDesc, BufferUsage, MappedMemory, MemoryLocation};
use gpu_buffer_engine::{engine_error, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use std::sync::MutexGuard;

use crate::vulkan_context::GpuContext;

/// Raw buffer stored in the device's handle table
pub(crate) struct VulkanBuffer {
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub(crate) size: u64,
    pub(crate) location: MemoryLocation,
    pub(crate) name: String,
    /// Set between `map` and `unmap`. The memory itself stays persistently
    /// mapped by gpu-allocator.
    mapped: bool,
}

impl VulkanBuffer {
    /// Create the buffer, allocate its memory and bind the two
    pub(crate) fn create(ctx: &GpuContext, desc: &BufferDesc) -> Result<Self> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| {
                    engine_error!("gpubuf::vulkan", "vkCreateBuffer failed for '{}' ({} bytes): {:?}", desc.name, desc.size, e);
                    if e == vk::Result::ERROR_OUT_OF_DEVICE_MEMORY || e == vk::Result::ERROR_OUT_OF_HOST_MEMORY {
                        Error::OutOfMemory
                    } else {
                        Error::BackendError(format!("vkCreateBuffer failed: {:?}", e))
                    }
                })?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = {
                let mut allocator = lock_allocator(ctx);
                allocator.allocate(&AllocationCreateDesc {
                    name: &desc.name,
                    requirements,
                    location: location_to_allocator(desc.location),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    engine_error!("gpubuf::vulkan", "Allocation of '{}' failed ({:.2} MB, {:?}): {}", desc.name, size_mb, desc.location, e);
                    return Err(match e {
                        gpu_allocator::AllocationError::OutOfMemory => Error::OutOfMemory,
                        other => Error::BackendError(format!("gpu-allocator: {}", other)),
                    });
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                engine_error!("gpubuf::vulkan", "vkBindBufferMemory failed for '{}': {:?}", desc.name, e);
                free_allocation(ctx, allocation);
                ctx.device.destroy_buffer(buffer, None);
                return Err(Error::BackendError(format!("vkBindBufferMemory failed: {:?}", e)));
            }

            Ok(Self {
                buffer,
                allocation: Some(allocation),
                size: desc.size,
                location: desc.location,
                name: desc.name.clone(),
                mapped: false,
            })
        }
    }

    /// Hand out the persistent host pointer of a host-visible allocation
    pub(crate) fn map(&mut self) -> Result<MappedMemory> {
        if !self.location.is_host_visible() {
            return Err(Error::MapError(format!("'{}' lives in device-local memory", self.name)));
        }
        if self.mapped && self.location != MemoryLocation::HostCoherent {
            return Err(Error::MapError(format!("'{}' is already mapped", self.name)));
        }
        let ptr = self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| Error::MapError(format!("'{}' has no host mapping", self.name)))?;

        self.mapped = true;
        // gpu-allocator keeps host-visible blocks mapped for the allocation's
        // lifetime, and the allocation is at least `size` bytes.
        Ok(unsafe { MappedMemory::from_raw(ptr.cast::<u8>(), self.size as usize) })
    }

    pub(crate) fn unmap(&mut self) -> Result<()> {
        if !self.mapped {
            return Err(Error::MapError(format!("'{}' is not mapped", self.name)));
        }
        self.mapped = false;
        Ok(())
    }

    /// Free the allocation then destroy the buffer
    pub(crate) fn destroy(mut self, ctx: &GpuContext) {
        if let Some(allocation) = self.allocation.take() {
            free_allocation(ctx, allocation);
        }
        unsafe {
            ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

// A panic while the allocator was locked leaves it consistent; keep going
// so buffers can still be released
pub(crate) fn lock_allocator(ctx: &GpuContext) -> MutexGuard<'_, Allocator> {
    ctx.allocator.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn free_allocation(ctx: &GpuContext, allocation: Allocation) {
    if let Err(e) = lock_allocator(ctx).free(allocation) {
        engine_warn!("gpubuf::vulkan", "gpu-allocator free failed: {}", e);
    }
}

/// Buffer usage bits as Vulkan usage flags
pub(crate) fn usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

/// Memory placement as a gpu-allocator location
///
/// gpu-allocator has no separate coherent location: `CpuToGpu` picks
/// HOST_VISIBLE | HOST_COHERENT memory and keeps it mapped.
pub(crate) fn location_to_allocator(location: MemoryLocation) -> gpu_allocator::MemoryLocation {
    match location {
        MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::HostCoherent => gpu_allocator::MemoryLocation::CpuToGpu,
        MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}
