/// Transfer commands, synchronization barriers and the single-shot recorder trait

use std::any::Any;

use bitflags::bitflags;

use crate::device::BufferHandle;
use crate::error::Result;

bitflags! {
    /// Pipeline stages a barrier waits on / blocks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const COMPUTE_SHADER = 1 << 4;
        const TRANSFER = 1 << 5;
        const HOST = 1 << 6;
    }
}

bitflags! {
    /// Memory access kinds made available / visible by a barrier
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDEX_READ = 1 << 0;
        const VERTEX_ATTRIBUTE_READ = 1 << 1;
        const SHADER_READ = 1 << 2;
        const SHADER_WRITE = 1 << 3;
        const TRANSFER_READ = 1 << 4;
        const TRANSFER_WRITE = 1 << 5;
        const HOST_READ = 1 << 6;
        const HOST_WRITE = 1 << 7;
    }
}

/// Queue a single-shot command buffer is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub u32);

/// One buffer-to-buffer copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferDescriptor {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl TransferDescriptor {
    /// Copy of `size` bytes from offset 0 to offset 0
    pub fn whole(size: u64) -> Self {
        Self { src_offset: 0, dst_offset: 0, size }
    }
}

/// Buffer memory barrier
///
/// Makes `src_access` writes done in `src_stage` visible to `dst_access`
/// reads in `dst_stage`, for the byte range `[offset, offset + size)` of
/// `buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBarrier {
    pub buffer: BufferHandle,
    pub src_stage: PipelineStages,
    pub dst_stage: PipelineStages,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub offset: u64,
    pub size: u64,
}

impl SyncBarrier {
    /// Transfer write → consumer read on a freshly uploaded destination buffer
    pub fn after_upload(
        buffer: BufferHandle,
        size: u64,
        dst_stage: PipelineStages,
        dst_access: AccessFlags,
    ) -> Self {
        Self {
            buffer,
            src_stage: PipelineStages::TRANSFER,
            dst_stage,
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access,
            offset: 0,
            size,
        }
    }

    /// Shader writes → transfer read, recorded before copying a destination
    /// buffer out for readback
    pub fn before_readback(buffer: BufferHandle, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            src_stage: PipelineStages::VERTEX_SHADER | PipelineStages::COMPUTE_SHADER,
            dst_stage: PipelineStages::TRANSFER,
            src_access: AccessFlags::SHADER_WRITE,
            dst_access: AccessFlags::TRANSFER_READ,
            offset,
            size,
        }
    }

    /// Transfer write → host read on the readback buffer
    pub fn readback_to_host(buffer: BufferHandle, size: u64) -> Self {
        Self {
            buffer,
            src_stage: PipelineStages::TRANSFER,
            dst_stage: PipelineStages::HOST,
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::HOST_READ,
            offset: 0,
            size,
        }
    }
}

/// A command buffer in the recording state, created for exactly one submit
///
/// Returned by `GraphicsDevice::create_single_shot_commands` already begun
/// with the one-time-submit hint; consumed by `submit_single_shot`.
pub trait CommandRecorder: Send {
    /// Record a buffer-to-buffer copy
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        region: &TransferDescriptor,
    ) -> Result<()>;

    /// Record a buffer memory barrier
    fn buffer_barrier(&mut self, barrier: &SyncBarrier) -> Result<()>;

    /// Number of commands recorded so far
    fn recorded_count(&self) -> usize;

    /// Backend downcast hook used by `submit_single_shot`
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}
