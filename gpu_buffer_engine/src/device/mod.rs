/// Device layer: the allocator adapter and command submission interface
/// every buffer type is built on

pub mod buffer;
pub mod command;
pub mod graphics_device;

#[cfg(test)]
pub mod mock_device;

pub use buffer::{
    BufferDesc, BufferHandle, BufferRole, BufferUsage, MappedMemory, MemoryLocation, MemoryReport,
};
pub use command::{
    AccessFlags, CommandRecorder, PipelineStages, QueueId, SyncBarrier, TransferDescriptor,
};
pub use graphics_device::GraphicsDevice;
