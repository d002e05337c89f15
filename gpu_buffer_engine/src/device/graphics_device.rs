/// GraphicsDevice trait - the allocator adapter and submission primitives the
/// buffer engine is built on

use crate::device::{BufferDesc, BufferHandle, CommandRecorder, MappedMemory, MemoryReport, QueueId};
use crate::buffer::DEFAULT_BUFFER_SIZE;
use crate::error::Result;

/// Device interface consumed by every buffer type
///
/// Implemented by backends (`VulkanDevice`) and by the in-crate mock used
/// in tests. A device is shared (`Arc<dyn GraphicsDevice>`) by the render
/// context and every buffer it creates; buffers only borrow it per call.
///
/// Backends must make each method safe to call from one thread at a time
/// per buffer handle. The engine performs no locking of its own.
pub trait GraphicsDevice: Send + Sync {
    /// Allocate a buffer and its backing memory
    ///
    /// # Errors
    ///
    /// `Error::OutOfMemory` when the allocator is exhausted, `BackendError`
    /// for any other backend failure.
    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle>;

    /// Map a host-visible buffer
    ///
    /// Mapping a `HostCoherent` buffer twice returns the same persistent
    /// mapping. Mapping a `GpuOnly` buffer is a `MapError`.
    fn map_buffer(&self, buffer: BufferHandle) -> Result<MappedMemory>;

    /// Release a mapping obtained with `map_buffer`
    fn unmap_buffer(&self, buffer: BufferHandle) -> Result<()>;

    /// Destroy a buffer and free its allocation
    fn free_buffer(&self, buffer: BufferHandle) -> Result<()>;

    /// Size in bytes the buffer was allocated with
    fn buffer_size(&self, buffer: BufferHandle) -> Result<u64>;

    /// Queue used for uploads
    fn graphics_queue(&self) -> QueueId;

    /// Allocate a command buffer from the transient upload pool and begin
    /// recording with the one-time-submit hint
    fn create_single_shot_commands(&self) -> Result<Box<dyn CommandRecorder>>;

    /// End recording, submit to `queue`, block until the GPU finished, then
    /// free the command buffer
    ///
    /// # Errors
    ///
    /// `Error::SubmitError` if ending, submitting or waiting failed. The
    /// command buffer is freed in every case.
    fn submit_single_shot(&self, commands: Box<dyn CommandRecorder>, queue: QueueId) -> Result<()>;

    /// Block until the device is idle
    fn wait_idle(&self) -> Result<()>;

    /// Allocations currently alive on this device
    fn memory_report(&self) -> MemoryReport;

    /// Capacity of a buffer allocated by its first upload
    fn default_buffer_size(&self) -> u64 {
        DEFAULT_BUFFER_SIZE
    }
}
