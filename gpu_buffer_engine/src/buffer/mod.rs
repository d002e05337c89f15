/// Buffer engine: staged and coherent GPU buffers, the resize policy, the
/// single-shot submission helper and the typed index / vertex / storage
/// wrappers built on them

pub mod resize_policy;
pub mod single_shot;
pub mod staged_buffer;
pub mod coherent_buffer;
pub mod payload;
pub mod index_buffer;
pub mod vertex_buffer;
pub mod shader_storage_buffer;
pub mod release_queue;

pub use resize_policy::{ResizeDecision, ResizePolicy};
pub use single_shot::SingleShotCommands;
pub use staged_buffer::{BufferPair, StagedBuffer};
pub use coherent_buffer::CoherentBuffer;
pub use payload::{NodeTransformData, UploadPayload, Vertex};
pub use index_buffer::IndexBuffer;
pub use vertex_buffer::VertexBuffer;
pub use shader_storage_buffer::ShaderStorageBuffer;
pub use release_queue::{GpuResource, ReleaseQueue, ReleaseReport};

use crate::device::{AccessFlags, BufferUsage, PipelineStages};

/// Capacity a buffer gets on first use when the caller did not ask for one
pub const DEFAULT_BUFFER_SIZE: u64 = 1024;

/// What the GPU reads a buffer as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Vertex,
    Storage,
}

impl BufferKind {
    /// Usage bits of the buffer the GPU reads from
    pub fn usage(&self) -> BufferUsage {
        match self {
            BufferKind::Index => BufferUsage::INDEX,
            BufferKind::Vertex => BufferUsage::VERTEX,
            BufferKind::Storage => BufferUsage::STORAGE,
        }
    }

    /// Access mask of the consumer the upload barrier makes the data visible to
    pub fn consumer_access(&self) -> AccessFlags {
        match self {
            BufferKind::Index => AccessFlags::INDEX_READ,
            BufferKind::Vertex => AccessFlags::VERTEX_ATTRIBUTE_READ,
            BufferKind::Storage => AccessFlags::SHADER_READ,
        }
    }

    /// Pipeline stages that consume the buffer
    pub fn consumer_stages(&self) -> PipelineStages {
        match self {
            BufferKind::Index | BufferKind::Vertex => PipelineStages::VERTEX_INPUT,
            BufferKind::Storage => PipelineStages::VERTEX_SHADER | PipelineStages::COMPUTE_SHADER,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BufferKind::Index => "index",
            BufferKind::Vertex => "vertex",
            BufferKind::Storage => "storage",
        }
    }
}

#[cfg(test)]
#[path = "buffer_kind_tests.rs"]
mod tests;
