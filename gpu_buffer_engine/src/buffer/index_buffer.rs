/// Index buffer: 32-bit indices in device-local memory

use std::sync::Arc;

use crate::buffer::{BufferKind, GpuResource, StagedBuffer};
use crate::device::{BufferHandle, GraphicsDevice};
use crate::error::Result;

pub struct IndexBuffer {
    inner: StagedBuffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create an index buffer; the first upload allocates the default 1024 bytes
    pub fn new(device: Arc<dyn GraphicsDevice>, name: impl Into<String>) -> Self {
        Self {
            inner: StagedBuffer::new(device, BufferKind::Index, name),
            index_count: 0,
        }
    }

    pub fn init(&mut self, size: u64) -> Result<()> {
        self.inner.init(size)
    }

    /// Upload the indices of one mesh, growing the buffer if they do not fit
    pub fn upload_indices(&mut self, indices: &[u32]) -> Result<()> {
        self.inner.upload(indices).map_err(|e| {
            self.index_count = 0;
            e
        })?;
        self.index_count = indices.len() as u32;
        Ok(())
    }

    pub fn check_for_resize(&mut self, required: u64) -> Result<bool> {
        self.inner.check_for_resize(required)
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.index_count = 0;
        self.inner.cleanup()
    }

    /// Indices of the last successful upload, for `draw_indexed`. 0 after a failed one.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.inner.buffer()
    }

    pub fn capacity(&self) -> u64 {
        self.inner.capacity()
    }

    pub fn staged(&self) -> &StagedBuffer {
        &self.inner
    }
}

impl GpuResource for IndexBuffer {
    fn cleanup(&mut self) -> Result<()> {
        IndexBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
#[path = "index_buffer_tests.rs"]
mod tests;
