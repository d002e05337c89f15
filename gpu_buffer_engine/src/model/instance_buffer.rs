/// Per-frame instance matrices in a coherent storage buffer

use std::sync::Arc;

use glam::Mat4;

use crate::buffer::{GpuResource, ShaderStorageBuffer};
use crate::device::{BufferHandle, GraphicsDevice};
use crate::error::{Error, Result};

/// World matrices of every instance of a model, rewritten each frame
pub struct InstanceBuffer {
    storage: ShaderStorageBuffer,
    instance_count: usize,
}

impl InstanceBuffer {
    pub fn new(device: Arc<dyn GraphicsDevice>, name: impl Into<String>) -> Result<Self> {
        let size = device.default_buffer_size();
        Ok(Self {
            storage: ShaderStorageBuffer::init_coherent(device, name, size)?,
            instance_count: 0,
        })
    }

    /// Write this frame's matrices, growing the buffer when there are more
    /// instances than last time
    pub fn update(&mut self, matrices: &[Mat4]) -> Result<()> {
        self.storage.upload_mat4s(matrices)?;
        self.instance_count = matrices.len();
        Ok(())
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    /// Matrix of instance `index` as the GPU currently sees it
    pub fn matrix(&self, index: usize) -> Result<Mat4> {
        let offset = (index as u64)
            .checked_mul(std::mem::size_of::<Mat4>() as u64)
            .ok_or_else(|| Error::InvalidResource(format!("{}: instance {} out of range", self.storage.name(), index)))?;
        self.storage.get_ssbo_data_mat4(offset)
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        self.storage.buffer()
    }

    pub fn capacity(&self) -> u64 {
        self.storage.capacity()
    }

    pub fn cleanup(&mut self) -> Result<()> {
        self.instance_count = 0;
        self.storage.cleanup()
    }
}

impl GpuResource for InstanceBuffer {
    fn cleanup(&mut self) -> Result<()> {
        InstanceBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        self.storage.name()
    }
}

#[cfg(test)]
#[path = "instance_buffer_tests.rs"]
mod tests;
