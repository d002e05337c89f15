/// Staged GPU buffer: a device-local destination filled through a
/// host-visible staging buffer of the same size
///
/// Upload path: resize check, map staging, copy, unmap, then one single-shot
/// command buffer that copies the whole staging extent into the destination
/// and inserts a transfer-write to consumer-read barrier, submitted and
/// waited on before `upload_data` returns.

use std::sync::Arc;

use bytemuck::Pod;

use crate::buffer::{
    BufferKind, GpuResource, ResizeDecision, ResizePolicy, SingleShotCommands, UploadPayload,
};
use crate::device::{
    BufferDesc, BufferHandle, BufferRole, BufferUsage, GraphicsDevice, MemoryLocation,
    SyncBarrier, TransferDescriptor,
};
use crate::error::{Error, Result};
use crate::{engine_debug, engine_error, engine_info, engine_warn};

/// Destination + staging buffers that are always the same size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPair {
    pub destination: BufferHandle,
    pub staging: BufferHandle,
    /// Capacity of both buffers in bytes
    pub size: u64,
}

#[derive(Debug)]
enum State {
    Uninitialized,
    Allocated(BufferPair),
    /// `init` got the destination but not the staging buffer. Only `cleanup` is allowed.
    Faulted { destination: BufferHandle, size: u64 },
    Destroyed,
}

/// Index, vertex or storage data mirrored into device-local memory
pub struct StagedBuffer {
    device: Arc<dyn GraphicsDevice>,
    kind: BufferKind,
    name: String,
    default_size: u64,
    state: State,
    /// Cleared when an upload fails after the pair was allocated
    contents_valid: bool,
}

impl StagedBuffer {
    /// Create an uninitialized buffer. Nothing is allocated until `init`
    /// or the first upload.
    pub fn new(device: Arc<dyn GraphicsDevice>, kind: BufferKind, name: impl Into<String>) -> Self {
        Self {
            default_size: device.default_buffer_size(),
            device,
            kind,
            name: name.into(),
            state: State::Uninitialized,
            contents_valid: true,
        }
    }

    /// Capacity used when the first upload allocates the pair
    pub fn with_default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    // ===== LIFECYCLE =====

    /// Allocate the destination and staging buffers, both `target_size` bytes
    ///
    /// # Errors
    ///
    /// `Error::AllocationError` naming the buffer that failed. When the
    /// staging allocation fails the destination stays allocated and the
    /// buffer is unusable until `cleanup` is called.
    pub fn init(&mut self, target_size: u64) -> Result<()> {
        match self.state {
            State::Uninitialized | State::Destroyed => {}
            State::Allocated(_) | State::Faulted { .. } => {
                return Err(Error::InvalidResource(format!(
                    "{}: init on a buffer that is still allocated, call cleanup first",
                    self.name
                )));
            }
        }
        if target_size == 0 {
            return Err(Error::InvalidResource(format!("{}: init with zero size", self.name)));
        }

        let destination = self
            .device
            .allocate_buffer(&BufferDesc {
                name: format!("{} ({})", self.name, BufferRole::Destination),
                size: target_size,
                usage: self.kind.usage() | BufferUsage::TRANSFER_DST | BufferUsage::TRANSFER_SRC,
                location: MemoryLocation::GpuOnly,
            })
            .map_err(|e| self.allocation_failed(BufferRole::Destination, target_size, e))?;

        let staging = match self.device.allocate_buffer(&BufferDesc {
            name: format!("{} ({})", self.name, BufferRole::Staging),
            size: target_size,
            usage: BufferUsage::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
        }) {
            Ok(handle) => handle,
            Err(e) => {
                self.state = State::Faulted { destination, size: target_size };
                return Err(self.allocation_failed(BufferRole::Staging, target_size, e));
            }
        };

        self.state = State::Allocated(BufferPair { destination, staging, size: target_size });
        self.contents_valid = true;
        engine_debug!(
            "gpubuf::StagedBuffer",
            "{}: allocated {} buffer pair of {} bytes",
            self.name, self.kind.label(), target_size
        );
        Ok(())
    }

    /// Destroy staging then destination
    ///
    /// Also releases the destination left behind by a failed `init`. The
    /// buffer may be initialized again afterwards.
    ///
    /// # Errors
    ///
    /// `Error::InvalidResource` when the buffer was already cleaned up.
    /// Backend free failures are logged and the first one is returned; the
    /// buffer is considered destroyed either way.
    pub fn cleanup(&mut self) -> Result<()> {
        if matches!(self.state, State::Destroyed) {
            return Err(Error::InvalidResource(format!("{}: cleanup called twice", self.name)));
        }
        self.release()
    }

    // ===== UPLOAD =====

    /// Copy `bytes` into the destination buffer and wait until the GPU can read them
    ///
    /// Grows the pair to exactly `bytes.len()` first when it does not fit.
    /// An uninitialized buffer is allocated with `max(default size, len)`.
    /// An empty payload does nothing.
    ///
    /// # Errors
    ///
    /// `AllocationError` if a resize failed, `MapError` if the staging
    /// buffer could not be mapped, `SubmitError` if the transfer failed. After
    /// a map or submit failure the destination contents are undefined:
    /// `buffer()` returns `None` until the next successful upload.
    pub fn upload_data(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let required = bytes.len() as u64;
        self.ensure_capacity(required)?;

        let pair = self.pair_or_err("upload_data")?;
        let result = self.write_staging(&pair, bytes).and_then(|_| self.transfer(&pair));
        self.contents_valid = result.is_ok();
        if let Err(e) = &result {
            engine_error!(
                "gpubuf::StagedBuffer",
                "{}: {} upload failed, contents undefined until the next upload ({})",
                self.name, self.kind.label(), e
            );
        }
        result
    }

    /// Upload a slice of plain-old-data elements
    pub fn upload<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        self.upload_data(bytemuck::cast_slice(data))
    }

    pub fn upload_payload(&mut self, payload: &UploadPayload<'_>) -> Result<()> {
        self.upload_data(payload.as_bytes())
    }

    /// Grow to `required` bytes when the current pair is smaller
    ///
    /// Returns `true` when a reallocation (one cleanup + init cycle) happened.
    pub fn check_for_resize(&mut self, required: u64) -> Result<bool> {
        self.ensure_capacity(required)
    }

    // ===== READBACK =====

    /// Copy `len` bytes at `offset` of the destination buffer back to the host
    ///
    /// Goes through a temporary host-visible buffer and its own single-shot
    /// submission, so it blocks like an upload.
    pub fn read_back(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let pair = self.pair_or_err("read_back")?;
        let end = offset.checked_add(len).filter(|&end| end <= pair.size);
        if end.is_none() {
            return Err(Error::InvalidResource(format!(
                "{}: read_back of {} bytes at offset {} exceeds capacity {}",
                self.name, len, offset, pair.size
            )));
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let readback = self
            .device
            .allocate_buffer(&BufferDesc {
                name: format!("{} ({})", self.name, BufferRole::Readback),
                size: len,
                usage: BufferUsage::TRANSFER_DST,
                location: MemoryLocation::GpuToCpu,
            })
            .map_err(|e| self.allocation_failed(BufferRole::Readback, len, e))?;

        let result = self.copy_out(pair.destination, readback, offset, len);
        if let Err(e) = self.device.free_buffer(readback) {
            engine_warn!("gpubuf::StagedBuffer", "{}: could not free readback buffer: {}", self.name, e);
        }
        result
    }

    // ===== ACCESSORS =====

    /// Capacity in bytes (0 unless allocated)
    pub fn capacity(&self) -> u64 {
        match &self.state {
            State::Allocated(pair) => pair.size,
            _ => 0,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination buffer to bind for drawing / dispatch
    ///
    /// `None` while unallocated or after a failed upload.
    pub fn buffer(&self) -> Option<BufferHandle> {
        self.pair().filter(|_| self.contents_valid).map(|p| p.destination)
    }

    pub fn pair(&self) -> Option<&BufferPair> {
        match &self.state {
            State::Allocated(pair) => Some(pair),
            _ => None,
        }
    }

    /// True when the pair is allocated and its contents can be drawn from
    pub fn is_valid(&self) -> bool {
        matches!(self.state, State::Allocated(_)) && self.contents_valid
    }

    /// True after an `init` that allocated only the destination
    pub fn is_faulted(&self) -> bool {
        matches!(self.state, State::Faulted { .. })
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    // ===== INTERNAL =====

    fn ensure_capacity(&mut self, required: u64) -> Result<bool> {
        let capacity = match self.state {
            State::Allocated(pair) => pair.size,
            State::Uninitialized => {
                self.init(required.max(self.default_size))?;
                return Ok(true);
            }
            State::Faulted { .. } => {
                return Err(Error::InvalidResource(format!(
                    "{}: buffer is partially initialized, call cleanup first",
                    self.name
                )));
            }
            State::Destroyed => {
                return Err(Error::InvalidResource(format!("{}: buffer was cleaned up", self.name)));
            }
        };

        match ResizePolicy::decide(capacity, required) {
            ResizeDecision::Reuse => Ok(false),
            ResizeDecision::Reallocate { new_size } => {
                self.release()?;
                self.init(new_size).map_err(|e| {
                    engine_error!(
                        "gpubuf::StagedBuffer",
                        "{}: could not create {} buffer of size {} bytes",
                        self.name, self.kind.label(), new_size
                    );
                    e
                })?;
                engine_info!(
                    "gpubuf::StagedBuffer",
                    "{}: {} buffer resize to {} bytes",
                    self.name, self.kind.label(), new_size
                );
                Ok(true)
            }
        }
    }

    /// Free whatever the current state holds and move to `Destroyed`
    fn release(&mut self) -> Result<()> {
        let handles: Vec<BufferHandle> = match std::mem::replace(&mut self.state, State::Destroyed) {
            State::Allocated(pair) => vec![pair.staging, pair.destination],
            State::Faulted { destination, .. } => vec![destination],
            State::Uninitialized | State::Destroyed => Vec::new(),
        };

        let mut first_error = None;
        for handle in handles {
            if let Err(e) = self.device.free_buffer(handle) {
                engine_error!("gpubuf::StagedBuffer", "{}: free_buffer failed: {}", self.name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn pair_or_err(&self, operation: &str) -> Result<BufferPair> {
        self.pair().copied().ok_or_else(|| {
            Error::InvalidResource(format!("{}: {} on a buffer that is not allocated", self.name, operation))
        })
    }

    fn write_staging(&self, pair: &BufferPair, bytes: &[u8]) -> Result<()> {
        let mut mapping = self.device.map_buffer(pair.staging).map_err(|e| {
            engine_error!(
                "gpubuf::StagedBuffer",
                "{}: could not map {} staging buffer memory ({})",
                self.name, self.kind.label(), e
            );
            match e {
                Error::MapError(_) => e,
                other => Error::MapError(other.to_string()),
            }
        })?;

        let written = mapping.write(0, bytes);
        let unmapped = self.device.unmap_buffer(pair.staging);
        written?;
        unmapped
    }

    fn transfer(&self, pair: &BufferPair) -> Result<()> {
        let mut commands = SingleShotCommands::begin(self.device.as_ref())?;
        commands.copy_buffer(pair.staging, pair.destination, &TransferDescriptor::whole(pair.size))?;
        commands.buffer_barrier(&SyncBarrier::after_upload(
            pair.destination,
            pair.size,
            self.kind.consumer_stages(),
            self.kind.consumer_access(),
        ))?;
        commands.submit(self.device.graphics_queue())
    }

    fn copy_out(&self, source: BufferHandle, readback: BufferHandle, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut commands = SingleShotCommands::begin(self.device.as_ref())?;
        commands.buffer_barrier(&SyncBarrier::before_readback(source, offset, len))?;
        commands.copy_buffer(
            source,
            readback,
            &TransferDescriptor { src_offset: offset, dst_offset: 0, size: len },
        )?;
        commands.buffer_barrier(&SyncBarrier::readback_to_host(readback, len))?;
        commands.submit(self.device.graphics_queue())?;

        let mapping = self.device.map_buffer(readback)?;
        let mut out = vec![0u8; len as usize];
        let read = mapping.read(0, &mut out);
        self.device.unmap_buffer(readback)?;
        read.map(|_| out)
    }

    fn allocation_failed(&self, role: BufferRole, size: u64, e: Error) -> Error {
        engine_error!(
            "gpubuf::StagedBuffer",
            "{}: could not allocate {} {} buffer of {} bytes ({})",
            self.name, self.kind.label(), role, size, e
        );
        Error::AllocationError { role, size, reason: e.to_string() }
    }
}

impl GpuResource for StagedBuffer {
    fn cleanup(&mut self) -> Result<()> {
        StagedBuffer::cleanup(self)
    }

    fn label(&self) -> &str {
        &self.name
    }
}

impl Drop for StagedBuffer {
    fn drop(&mut self) {
        let leaked = match &self.state {
            State::Allocated(pair) => pair.size * 2,
            State::Faulted { size, .. } => *size,
            State::Uninitialized | State::Destroyed => return,
        };
        engine_warn!(
            "gpubuf::StagedBuffer",
            "{}: dropped without cleanup, {} bytes still allocated",
            self.name, leaked
        );
    }
}

#[cfg(test)]
#[path = "staged_buffer_tests.rs"]
mod tests;
