/// Vertex + index buffers of one mesh

use std::sync::Arc;

use crate::buffer::{GpuResource, IndexBuffer, Vertex, VertexBuffer};
use crate::device::{BufferHandle, GraphicsDevice};
use crate::error::Result;
use crate::{engine_error, engine_warn};

/// CPU-side mesh as produced by the model importer
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

pub struct MeshBuffers {
    name: String,
    vertices: VertexBuffer,
    indices: IndexBuffer,
}

impl MeshBuffers {
    /// Create both buffers and upload `mesh` into them
    ///
    /// # Errors
    ///
    /// The first upload error. Both buffers are cleaned up before returning.
    pub fn load(device: &Arc<dyn GraphicsDevice>, name: impl Into<String>, mesh: &MeshData) -> Result<Self> {
        let name = name.into();
        let mut buffers = Self {
            vertices: VertexBuffer::new(device.clone(), format!("{} vertices", name)),
            indices: IndexBuffer::new(device.clone(), format!("{} indices", name)),
            name,
        };

        let uploaded = buffers
            .vertices
            .upload_vertices(&mesh.vertices)
            .and_then(|_| buffers.indices.upload_indices(&mesh.indices));

        if let Err(e) = uploaded {
            engine_error!("gpubuf::Model", "{}: mesh upload failed, releasing its buffers: {}", buffers.name, e);
            buffers.release_after_failure();
            return Err(e);
        }
        Ok(buffers)
    }

    pub fn cleanup(&mut self) -> Result<()> {
        let vertices = self.vertices.cleanup();
        let indices = self.indices.cleanup();
        vertices.and(indices)
    }

    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertices.buffer()
    }

    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.indices.buffer()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.vertex_count()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.index_count()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Best-effort cleanup on a failed load; never-allocated halves are skipped
    pub(crate) fn release_after_failure(&mut self) {
        if let Err(e) = self.cleanup() {
            engine_warn!("gpubuf::Model", "{}: cleanup after failed load reported: {}", self.name, e);
        }
    }
}

impl GpuResource for MeshBuffers {
    fn cleanup(&mut self) -> Result<()> {
        MeshBuffers::cleanup(self)
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[path = "mesh_buffers_tests.rs"]
mod tests;
