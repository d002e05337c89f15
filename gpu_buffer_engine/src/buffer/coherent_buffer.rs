/// Coherent buffer: one persistently mapped host-coherent allocation the CPU
/// writes directly, for data that changes every frame
///
/// No staging buffer, no transfer and no barrier. Writes are visible to the
/// GPU once the next submission that reads them is made.

use std::sync::Arc;

use bytemuck::Pod;

use crate::buffer::{BufferKind, GpuResource, ResizeDecision, ResizePolicy, UploadPayload};
use crate::device::{BufferDesc, BufferHandle, BufferRole, GraphicsDevice, MappedMemory, MemoryLocation};
use crate::error::{Error, Result};
use crate::{engine_debug, engine_error, engine_info, engine_warn};

#[derive(Debug)]
enum State {
    Uninitialized,
    Allocated { buffer: BufferHandle, mapping: MappedMemory, size: u64 },
    Destroyed,
}

pub struct CoherentBuffer {
    device: Arc<dyn GraphicsDevice>,
    kind: BufferKind,
    name: String,
    default_size: u64,
    state: State,
}

impl CoherentBuffer {
    pub fn new(device: Arc<dyn GraphicsDevice>, kind: BufferKind, name: impl Into<String>) -> Self {
        Self {
            default_size: device.default_buffer_size(),
            device,
            kind,
            name: name.into(),
            state: State::Uninitialized,
        }
    }

    pub fn with_default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    /// Allocate `size` bytes of host-coherent memory and map it for the
    /// lifetime of the allocation
    ///
    /// All or nothing: if mapping fails the allocation is freed again.
    pub fn init_coherent(&mut self, size: u64) -> Result<()> {
        if matches!(self.state, State::Allocated { .. }) {
            return Err(Error::InvalidResource(format!(
                "{}: init_coherent on a buffer that is still allocated, call cleanup first",
                self.name
            )));
        }
        if size == 0 {
            return Err(Error::InvalidResource(format!("{}: init_coherent with zero size", self.name)));
        }

        let buffer = self
            .device
            .allocate_buffer(&BufferDesc {
                name: format!("{} ({})", self.name, BufferRole::Coherent),
                size,
                usage: self.kind.usage(),
                location: MemoryLocation::HostCoherent,
            })
            .map_err(|e| {
                engine_error!(
                    "gpubuf::CoherentBuffer",
                    "{}: could not allocate coherent {} buffer of {} bytes ({})",
                    self.name, self.kind.label(), size, e
                );
                Error::AllocationError { role: BufferRole::Coherent, size, reason: e.to_string() }
            })?;

        let mapping = match self.device.map_buffer(buffer) {
            Ok(mapping) => mapping,
            Err(e) => {
                engine_error!("gpubuf::CoherentBuffer", "{}: could not map coherent buffer ({})", self.name, e);
                if let Err(free_err) = self.device.free_buffer(buffer) {
                    engine_error!("gpubuf::CoherentBuffer", "{}: free_buffer failed: {}", self.name, free_err);
                }
                return Err(match e {
                    Error::MapError(_) => e,
                    other => Error::MapError(other.to_string()),
                });
            }
        };

        self.state = State::Allocated { buffer, mapping, size };
        engine_debug!(
            "gpubuf::CoherentBuffer",
            "{}: allocated coherent {} buffer of {} bytes",
            self.name, self.kind.label(), size
        );
        Ok(())
    }

    /// Write `bytes` at offset 0, growing to exactly `bytes.len()` first if needed
    pub fn upload_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.ensure_capacity(bytes.len() as u64)?;
        self.write_at(0, bytes)
    }

    pub fn upload<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.upload_data(bytemuck::cast_slice(data))
    }

    pub fn upload_payload(&mut self, payload: &UploadPayload<'_>) -> Result<()> {
        self.upload_data(payload.as_bytes())
    }

    /// Overwrite part of the buffer without resizing
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        match &mut self.state {
            State::Allocated { mapping, .. } => mapping.write(offset as usize, bytes),
            _ => Err(Error::InvalidResource(format!("{}: write on a buffer that is not allocated", self.name))),
        }
    }

    /// Grow to `required` bytes when smaller. Returns whether it reallocated.
    ///
    /// Contents are not preserved across a reallocation.
    pub fn check_for_resize(&mut self, required: u64) -> Result<bool> {
        self.ensure_capacity(required)
    }

    /// Unmap and free the buffer
    pub fn cleanup(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Destroyed) {
            State::Allocated { buffer, mapping, .. } => {
                drop(mapping);
                let unmapped = self.device.unmap_buffer(buffer);
                let freed = self.device.free_buffer(buffer);
                if let Err(e) = unmapped.as_ref().and(freed.as_ref()) {
                    engine_error!("gpubuf::CoherentBuffer", "{}: cleanup failed: {}", self.name, e);
                }
                unmapped.and(freed)
            }
            State::Uninitialized => Ok(()),
            State::Destroyed => Err(Error::InvalidResource(format!("{}: cleanup called twice", self.name))),
        }
    }

    /// Copy `len` bytes at `offset` straight out of the mapping
    pub fn read_back(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        match &self.state {
            State::Allocated { mapping, size, .. } => {
                if offset.checked_add(len).filter(|&end| end <= *size).is_none() {
                    return Err(Error::InvalidResource(format!(
                        "{}: read_back of {} bytes at offset {} exceeds capacity {}",
                        self.name, len, offset, size
                    )));
                }
                let mut out = vec![0u8; len as usize];
                mapping.read(offset as usize, &mut out)?;
                Ok(out)
            }
            _ => Err(Error::InvalidResource(format!("{}: read_back on a buffer that is not allocated", self.name))),
        }
    }

    pub fn capacity(&self) -> u64 {
        match &self.state {
            State::Allocated { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        match &self.state {
            State::Allocated { buffer, .. } => Some(*buffer),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.state, State::Allocated { .. })
    }

    fn ensure_capacity(&mut self, required: u64) -> Result<bool> {
        match self.state {
            State::Allocated { .. } => {}
            State::Uninitialized => {
                self.init_coherent(required.max(self.default_size))?;
                return Ok(true);
            }
            State::Destroyed => {
                return Err(Error::InvalidResource(format!("{}: buffer was cleaned up", self.name)));
            }
        }

        match ResizePolicy::decide(self.capacity(), required) {
            ResizeDecision::Reuse => Ok(false),
            ResizeDecision::Reallocate { new_size } => {
                self.cleanup()?;
                self.init_coherent(new_size)?;
                engine_info!(
                    "gpubuf::CoherentBuffer",
                    "{}: coherent {} buffer resize to {} bytes",
                    self.name, self.kind.label(), new_size
                );
                Ok(true)
            }
        }
    }
}

impl GpuResource for CoherentBuffer {
    fn cleanup(&mut self) -> Result<()> {
        CoherentBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        &self.name
    }
}

impl Drop for CoherentBuffer {
    fn drop(&mut self) {
        if self.is_valid() {
            engine_warn!(
                "gpubuf::CoherentBuffer",
                "{}: dropped without cleanup, {} bytes still allocated",
                self.name, self.capacity()
            );
        }
    }
}

#[cfg(test)]
#[path = "coherent_buffer_tests.rs"]
mod tests;
