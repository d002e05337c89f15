/// Raw device buffers: descriptors, handles, usage and memory placement

use std::fmt;
use std::ptr::NonNull;

use bitflags::bitflags;
use slotmap::new_key_type;

use crate::error::{Error, Result};

new_key_type! {
    /// Opaque handle to a device buffer and its backing allocation.
    ///
    /// Only meaningful to the device that returned it. Owned exclusively by
    /// the buffer object that allocated it and freed exactly once.
    pub struct BufferHandle;
}

bitflags! {
    /// Buffer usage bits passed to the backend at allocation time
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const STORAGE = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
        const TRANSFER_DST = 1 << 4;
    }
}

/// Where the allocation lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device-local, not host visible
    GpuOnly,
    /// Host-visible upload memory (staging buffers)
    CpuToGpu,
    /// Host-visible, host-coherent memory that stays mapped for its whole life
    HostCoherent,
    /// Host-visible memory optimized for GPU → CPU readback
    GpuToCpu,
}

impl MemoryLocation {
    /// True when the CPU can map this memory
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryLocation::GpuOnly)
    }
}

/// Which allocation of a buffer object a handle belongs to.
///
/// Carried by `Error::AllocationError` so the caller knows which half of a
/// pair failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    /// Device-local buffer the GPU reads from
    Destination,
    /// Host-visible transfer source paired with a destination
    Staging,
    /// Single persistently mapped buffer (coherent variant)
    Coherent,
    /// Temporary host-visible copy target used for readback
    Readback,
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferRole::Destination => "destination",
            BufferRole::Staging => "staging",
            BufferRole::Coherent => "coherent",
            BufferRole::Readback => "readback",
        };
        f.write_str(name)
    }
}

/// Descriptor for allocating a raw device buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label (shows up in allocator reports)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Usage bits
    pub usage: BufferUsage,
    /// Memory placement
    pub location: MemoryLocation,
}

/// Live allocation summary, used for leak checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReport {
    /// Buffers allocated and not yet freed
    pub live_buffers: usize,
    /// Sum of their sizes in bytes
    pub live_bytes: u64,
}

impl MemoryReport {
    /// True when nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.live_buffers == 0
    }
}

/// A host-visible mapping returned by `GraphicsDevice::map_buffer`
///
/// Valid until the matching `unmap_buffer` (or `free_buffer`) call. All
/// accesses are bounds checked against the mapped length.
#[derive(Debug)]
pub struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain host memory owned by the device allocation; moving the
// pointer to another thread is fine as long as the owner serializes access,
// which `&mut self` on every buffer operation already enforces.
unsafe impl Send for MappedMemory {}

impl MappedMemory {
    /// Wrap a raw mapping
    ///
    /// # Safety
    ///
    /// `ptr` must point to at least `len` bytes of host-visible memory that
    /// stay valid and unaliased by other Rust references until the buffer is
    /// unmapped or freed.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Mapped length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length mapping
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `data` into the mapping at `offset`
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len()).filter(|&end| end <= self.len).ok_or_else(|| {
            Error::InvalidResource(format!(
                "write of {} bytes at offset {} exceeds mapping of {} bytes",
                data.len(), offset, self.len
            ))
        })?;
        debug_assert!(end <= self.len);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
        Ok(())
    }

    /// Copy `out.len()` bytes starting at `offset` out of the mapping
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        offset.checked_add(out.len()).filter(|&end| end <= self.len).ok_or_else(|| {
            Error::InvalidResource(format!(
                "read of {} bytes at offset {} exceeds mapping of {} bytes",
                out.len(), offset, self.len
            ))
        })?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
