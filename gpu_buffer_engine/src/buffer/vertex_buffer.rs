/// Vertex buffer: interleaved `Vertex` records in device-local memory

use std::sync::Arc;

use crate::buffer::{BufferKind, GpuResource, StagedBuffer, Vertex};
use crate::device::{BufferHandle, GraphicsDevice};
use crate::error::Result;

pub struct VertexBuffer {
    inner: StagedBuffer,
    vertex_count: u32,
}

impl VertexBuffer {
    pub fn new(device: Arc<dyn GraphicsDevice>, name: impl Into<String>) -> Self {
        Self {
            inner: StagedBuffer::new(device, BufferKind::Vertex, name),
            vertex_count: 0,
        }
    }

    pub fn init(&mut self, size: u64) -> Result<()> {
        self.inner.init(size)
    }

    pub fn upload_vertices(&mut self, vertices: &[Vertex]) -> Result<()> {
        self.inner.upload(vertices).map_err(|e| {
            self.vertex_count = 0;
            e
        })?;
        self.vertex_count = vertices.len() as u32;
        Ok(())
    }

    pub fn check_for_resize(&mut self, required: u64) -> Result<bool> {
        self.inner.check_for_resize(required)
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.vertex_count = 0;
        self.inner.cleanup()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
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

impl GpuResource for VertexBuffer {
    fn cleanup(&mut self) -> Result<()> {
        VertexBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
#[path = "vertex_buffer_tests.rs"]
mod tests;
