/// Mock graphics device for unit tests (no GPU required)
///
/// Buffers live in host memory. Every device call is recorded, copies run at
/// submit time so uploaded bytes can be read back, and each copy must be
/// followed by a barrier on its destination or the submit is flagged as a
/// validation error. Faults can be injected into allocation, mapping and
/// submission.

use std::any::Any;
use std::ptr::NonNull;
use std::sync::Mutex;

use slotmap::SlotMap;

use crate::buffer::DEFAULT_BUFFER_SIZE;
use crate::device::{
    AccessFlags, BufferDesc, BufferHandle, CommandRecorder, GraphicsDevice, MappedMemory,
    MemoryLocation, MemoryReport, QueueId, SyncBarrier, TransferDescriptor,
};
use crate::error::{Error, Result};
use crate::{engine_bail, engine_debug};

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub desc: BufferDesc,
    /// Backing bytes. Boxed slice so mappings stay valid while the table grows.
    data: Box<[u8]>,
    mapped: bool,
}

impl MockBuffer {
    fn new(desc: BufferDesc) -> Self {
        let data = vec![0u8; desc.size as usize].into_boxed_slice();
        Self { desc, data, mapped: false }
    }
}

// ============================================================================
// Mock CommandRecorder
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    Copy { src: BufferHandle, dst: BufferHandle, region: TransferDescriptor },
    Barrier(SyncBarrier),
}

#[derive(Debug, Default)]
pub struct MockCommandRecorder {
    pub commands: Vec<MockCommand>,
}

impl CommandRecorder for MockCommandRecorder {
    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        region: &TransferDescriptor,
    ) -> Result<()> {
        self.commands.push(MockCommand::Copy { src, dst, region: *region });
        Ok(())
    }

    fn buffer_barrier(&mut self, barrier: &SyncBarrier) -> Result<()> {
        self.commands.push(MockCommand::Barrier(*barrier));
        Ok(())
    }

    fn recorded_count(&self) -> usize {
        self.commands.len()
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ============================================================================
// Call log + faults
// ============================================================================

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Allocate { handle: BufferHandle, name: String, size: u64, location: MemoryLocation },
    AllocateFailed { name: String, size: u64, location: MemoryLocation },
    Map(BufferHandle),
    Unmap(BufferHandle),
    Free(BufferHandle),
    CreateCommands,
    Submit { queue: QueueId, commands: Vec<MockCommand>, succeeded: bool },
    WaitIdle,
}

#[derive(Debug, Default)]
struct Faults {
    /// Fail the n-th allocation from now (1 = next one)
    allocation_countdown: Option<usize>,
    /// Fail every allocation in this memory location
    allocation_location: Option<MemoryLocation>,
    map: bool,
    submit: bool,
    create_commands: bool,
    free: bool,
}

// ============================================================================
// Mock Device
// ============================================================================

/// Mock device that tracks allocations and executes transfers on the CPU
#[derive(Debug, Default)]
pub struct MockDevice {
    buffers: Mutex<SlotMap<BufferHandle, MockBuffer>>,
    calls: Mutex<Vec<MockCall>>,
    faults: Mutex<Faults>,
    validation_errors: Mutex<Vec<String>>,
    default_buffer_size: Option<u64>,
}

impl MockDevice {
    /// Create a new mock device
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `size` as the default buffer capacity instead of 1024
    pub fn with_default_buffer_size(mut self, size: u64) -> Self {
        self.default_buffer_size = Some(size);
        self
    }

    // ===== FAULT INJECTION =====

    /// Make the `n`-th allocation from now fail (1 = the next call)
    pub fn fail_nth_allocation(&self, n: usize) {
        self.faults.lock().unwrap().allocation_countdown = Some(n);
    }

    /// Make every allocation in `location` fail until faults are cleared
    pub fn fail_allocations_in(&self, location: MemoryLocation) {
        self.faults.lock().unwrap().allocation_location = Some(location);
    }

    pub fn fail_map(&self, fail: bool) {
        self.faults.lock().unwrap().map = fail;
    }

    pub fn fail_submit(&self, fail: bool) {
        self.faults.lock().unwrap().submit = fail;
    }

    pub fn fail_create_commands(&self, fail: bool) {
        self.faults.lock().unwrap().create_commands = fail;
    }

    /// Make `free_buffer` fail and keep the buffer alive
    pub fn fail_free(&self, fail: bool) {
        self.faults.lock().unwrap().free = fail;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    // ===== INSPECTION =====

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Successful allocations in the call log
    pub fn allocation_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Allocate { .. }))
    }

    pub fn free_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Free(_)))
    }

    /// Number of times `handle` was freed
    pub fn times_freed(&self, handle: BufferHandle) -> usize {
        self.count(|c| *c == MockCall::Free(handle))
    }

    pub fn submit_count(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Submit { .. }))
    }

    /// Commands of the most recent submit
    pub fn last_submit(&self) -> Option<Vec<MockCommand>> {
        self.calls.lock().unwrap().iter().rev().find_map(|c| match c {
            MockCall::Submit { commands, .. } => Some(commands.clone()),
            _ => None,
        })
    }

    /// Copy of a live buffer's contents
    pub fn contents(&self, handle: BufferHandle) -> Option<Vec<u8>> {
        self.buffers.lock().unwrap().get(handle).map(|b| b.data.to_vec())
    }

    /// Descriptor a live buffer was allocated with
    pub fn desc(&self, handle: BufferHandle) -> Option<BufferDesc> {
        self.buffers.lock().unwrap().get(handle).map(|b| b.desc.clone())
    }

    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.buffers.lock().unwrap().contains_key(handle)
    }

    pub fn is_mapped(&self, handle: BufferHandle) -> bool {
        self.buffers.lock().unwrap().get(handle).is_some_and(|b| b.mapped)
    }

    /// Barrier ordering problems found at submit time
    pub fn validation_errors(&self) -> Vec<String> {
        self.validation_errors.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn should_fail_allocation(&self, location: MemoryLocation) -> bool {
        let mut faults = self.faults.lock().unwrap();
        if faults.allocation_location == Some(location) {
            return true;
        }
        match faults.allocation_countdown {
            Some(1) => {
                faults.allocation_countdown = None;
                true
            }
            Some(n) => {
                faults.allocation_countdown = Some(n - 1);
                false
            }
            None => false,
        }
    }

    /// Every copy must be followed by a transfer-write barrier on its destination
    fn validate(&self, commands: &[MockCommand]) {
        for (i, command) in commands.iter().enumerate() {
            if let MockCommand::Copy { dst, .. } = command {
                let covered = commands[i + 1..].iter().any(|c| {
                    matches!(c, MockCommand::Barrier(b)
                        if b.buffer == *dst && b.src_access.contains(AccessFlags::TRANSFER_WRITE))
                });
                if !covered {
                    self.validation_errors
                        .lock()
                        .unwrap()
                        .push(format!("copy #{} into {:?} has no barrier after it", i, dst));
                }
            }
        }
    }

    fn execute(&self, commands: &[MockCommand]) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        for command in commands {
            let MockCommand::Copy { src, dst, region } = command else {
                continue;
            };
            let src_start = region.src_offset as usize;
            let dst_start = region.dst_offset as usize;
            let len = region.size as usize;

            let bytes = match buffers.get(*src) {
                Some(b) if src_start + len <= b.data.len() => b.data[src_start..src_start + len].to_vec(),
                Some(_) => return Err(Error::SubmitError(format!("mock: copy source range out of bounds ({:?})", region))),
                None => return Err(Error::SubmitError("mock: copy from unknown buffer".to_string())),
            };
            match buffers.get_mut(*dst) {
                Some(b) if dst_start + len <= b.data.len() => {
                    b.data[dst_start..dst_start + len].copy_from_slice(&bytes);
                }
                Some(_) => return Err(Error::SubmitError(format!("mock: copy destination range out of bounds ({:?})", region))),
                None => return Err(Error::SubmitError("mock: copy into unknown buffer".to_string())),
            }
        }
        Ok(())
    }
}

impl GraphicsDevice for MockDevice {
    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        if self.should_fail_allocation(desc.location) {
            self.record(MockCall::AllocateFailed {
                name: desc.name.clone(),
                size: desc.size,
                location: desc.location,
            });
            return Err(Error::OutOfMemory);
        }
        if desc.size == 0 {
            engine_bail!("gpubuf::mock", "allocate_buffer: '{}' has zero size", desc.name);
        }

        let handle = self.buffers.lock().unwrap().insert(MockBuffer::new(desc.clone()));
        self.record(MockCall::Allocate {
            handle,
            name: desc.name.clone(),
            size: desc.size,
            location: desc.location,
        });
        engine_debug!("gpubuf::mock", "allocated '{}' ({} bytes, {:?})", desc.name, desc.size, desc.location);
        Ok(handle)
    }

    fn map_buffer(&self, buffer: BufferHandle) -> Result<MappedMemory> {
        self.record(MockCall::Map(buffer));
        if self.faults.lock().unwrap().map {
            return Err(Error::MapError("mock: VK_ERROR_MEMORY_MAP_FAILED".to_string()));
        }

        let mut buffers = self.buffers.lock().unwrap();
        let entry = buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("mock: map of unknown buffer".to_string()))?;
        if !entry.desc.location.is_host_visible() {
            return Err(Error::MapError(format!("mock: '{}' is not host visible", entry.desc.name)));
        }
        if entry.mapped && entry.desc.location != MemoryLocation::HostCoherent {
            return Err(Error::MapError(format!("mock: '{}' is already mapped", entry.desc.name)));
        }
        entry.mapped = true;

        let ptr = NonNull::new(entry.data.as_mut_ptr())
            .ok_or_else(|| Error::MapError("mock: null mapping".to_string()))?;
        // SAFETY: the boxed slice is never reallocated and outlives the mapping
        // until free_buffer removes it
        Ok(unsafe { MappedMemory::from_raw(ptr, entry.data.len()) })
    }

    fn unmap_buffer(&self, buffer: BufferHandle) -> Result<()> {
        self.record(MockCall::Unmap(buffer));
        let mut buffers = self.buffers.lock().unwrap();
        let entry = buffers
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource("mock: unmap of unknown buffer".to_string()))?;
        if !entry.mapped {
            return Err(Error::InvalidResource(format!("mock: '{}' is not mapped", entry.desc.name)));
        }
        entry.mapped = false;
        Ok(())
    }

    fn free_buffer(&self, buffer: BufferHandle) -> Result<()> {
        self.record(MockCall::Free(buffer));
        if self.faults.lock().unwrap().free {
            return Err(Error::BackendError("mock: VK_ERROR_UNKNOWN on free".to_string()));
        }
        match self.buffers.lock().unwrap().remove(buffer) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidResource("mock: free of unknown or already freed buffer".to_string())),
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Result<u64> {
        self.buffers
            .lock()
            .unwrap()
            .get(buffer)
            .map(|b| b.desc.size)
            .ok_or_else(|| Error::InvalidResource("mock: unknown buffer".to_string()))
    }

    fn graphics_queue(&self) -> QueueId {
        QueueId(0)
    }

    fn create_single_shot_commands(&self) -> Result<Box<dyn CommandRecorder>> {
        self.record(MockCall::CreateCommands);
        if self.faults.lock().unwrap().create_commands {
            return Err(Error::BackendError("mock: VK_ERROR_OUT_OF_DEVICE_MEMORY".to_string()));
        }
        Ok(Box::new(MockCommandRecorder::default()))
    }

    fn submit_single_shot(&self, commands: Box<dyn CommandRecorder>, queue: QueueId) -> Result<()> {
        let recorder = commands
            .into_any()
            .downcast::<MockCommandRecorder>()
            .map_err(|_| Error::SubmitError("mock: foreign command recorder".to_string()))?;

        if self.faults.lock().unwrap().submit {
            self.record(MockCall::Submit { queue, commands: recorder.commands, succeeded: false });
            return Err(Error::SubmitError("mock: VK_ERROR_DEVICE_LOST".to_string()));
        }

        self.validate(&recorder.commands);
        let result = self.execute(&recorder.commands);
        self.record(MockCall::Submit { queue, commands: recorder.commands, succeeded: result.is_ok() });
        result
    }

    fn wait_idle(&self) -> Result<()> {
        self.record(MockCall::WaitIdle);
        Ok(())
    }

    fn memory_report(&self) -> MemoryReport {
        let buffers = self.buffers.lock().unwrap();
        MemoryReport {
            live_buffers: buffers.len(),
            live_bytes: buffers.values().map(|b| b.desc.size).sum(),
        }
    }

    fn default_buffer_size(&self) -> u64 {
        self.default_buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
#[path = "mock_device_tests.rs"]
mod tests;
