/// Shader storage buffer: bone matrices, per-instance transforms, lookup
/// tables
///
/// Either staged into device-local memory (`init`) or kept in persistently
/// mapped coherent memory (`init_coherent`) when it is rewritten every frame.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec4};

use crate::buffer::{
    BufferKind, CoherentBuffer, GpuResource, NodeTransformData, StagedBuffer, UploadPayload,
};
use crate::device::{BufferHandle, GraphicsDevice};
use crate::engine_warn;
use crate::error::{Error, Result};

enum Backing {
    Staged(StagedBuffer),
    Coherent(CoherentBuffer),
}

pub struct ShaderStorageBuffer {
    backing: Backing,
}

impl ShaderStorageBuffer {
    /// Staged storage buffer of `size` bytes (the usual default is 1024)
    pub fn init(device: Arc<dyn GraphicsDevice>, name: impl Into<String>, size: u64) -> Result<Self> {
        let mut staged = StagedBuffer::new(device, BufferKind::Storage, name);
        if let Err(e) = staged.init(size) {
            // Releases the destination a half-done init may have kept
            if let Err(cleanup_err) = staged.cleanup() {
                engine_warn!(
                    "gpubuf::ShaderStorageBuffer",
                    "{}: cleanup after failed init reported: {}",
                    staged.name(), cleanup_err
                );
            }
            return Err(e);
        }
        Ok(Self { backing: Backing::Staged(staged) })
    }

    /// Host-coherent storage buffer of `size` bytes, mapped for its whole life
    pub fn init_coherent(device: Arc<dyn GraphicsDevice>, name: impl Into<String>, size: u64) -> Result<Self> {
        let mut coherent = CoherentBuffer::new(device, BufferKind::Storage, name);
        coherent.init_coherent(size)?;
        Ok(Self { backing: Backing::Coherent(coherent) })
    }

    // ===== UPLOAD =====

    pub fn upload_data(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.backing {
            Backing::Staged(b) => b.upload_data(bytes),
            Backing::Coherent(b) => b.upload_data(bytes),
        }
    }

    pub fn upload_payload(&mut self, payload: &UploadPayload<'_>) -> Result<()> {
        self.upload_data(payload.as_bytes())
    }

    pub fn upload_mat4s(&mut self, data: &[Mat4]) -> Result<()> {
        self.upload_payload(&UploadPayload::Matrices(data))
    }

    pub fn upload_ints(&mut self, data: &[i32]) -> Result<()> {
        self.upload_payload(&UploadPayload::Ints(data))
    }

    pub fn upload_node_transforms(&mut self, data: &[NodeTransformData]) -> Result<()> {
        self.upload_payload(&UploadPayload::NodeTransforms(data))
    }

    pub fn upload_vec2s(&mut self, data: &[Vec2]) -> Result<()> {
        self.upload_payload(&UploadPayload::Vec2s(data))
    }

    pub fn upload_vec4s(&mut self, data: &[Vec4]) -> Result<()> {
        self.upload_payload(&UploadPayload::Vec4s(data))
    }

    pub fn check_for_resize(&mut self, required: u64) -> Result<bool> {
        match &mut self.backing {
            Backing::Staged(b) => b.check_for_resize(required),
            Backing::Coherent(b) => b.check_for_resize(required),
        }
    }

    pub fn cleanup(&mut self) -> Result<()> {
        match &mut self.backing {
            Backing::Staged(b) => b.cleanup(),
            Backing::Coherent(b) => b.cleanup(),
        }
    }

    // ===== READBACK =====

    /// Read the 4x4 matrix stored at byte `offset`
    ///
    /// # Errors
    ///
    /// `Error::InvalidResource` when `offset + 64` is past the capacity.
    pub fn get_ssbo_data_mat4(&self, offset: u64) -> Result<Mat4> {
        let size = std::mem::size_of::<Mat4>() as u64;
        let bytes = self.read_back(offset, size)?;
        if bytes.len() as u64 != size {
            return Err(Error::InvalidResource(format!(
                "get_ssbo_data_mat4: read {} bytes, expected {}",
                bytes.len(), size
            )));
        }
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn read_back(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        match &self.backing {
            Backing::Staged(b) => b.read_back(offset, len),
            Backing::Coherent(b) => b.read_back(offset, len),
        }
    }

    // ===== ACCESSORS =====

    pub fn buffer(&self) -> Option<BufferHandle> {
        match &self.backing {
            Backing::Staged(b) => b.buffer(),
            Backing::Coherent(b) => b.buffer(),
        }
    }

    pub fn capacity(&self) -> u64 {
        match &self.backing {
            Backing::Staged(b) => b.capacity(),
            Backing::Coherent(b) => b.capacity(),
        }
    }

    pub fn is_coherent(&self) -> bool {
        matches!(self.backing, Backing::Coherent(_))
    }

    pub fn is_valid(&self) -> bool {
        match &self.backing {
            Backing::Staged(b) => b.is_valid(),
            Backing::Coherent(b) => b.is_valid(),
        }
    }

    pub fn name(&self) -> &str {
        match &self.backing {
            Backing::Staged(b) => b.name(),
            Backing::Coherent(b) => b.name(),
        }
    }
}

impl GpuResource for ShaderStorageBuffer {
    fn cleanup(&mut self) -> Result<()> {
        ShaderStorageBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
#[path = "shader_storage_buffer_tests.rs"]
mod tests;
