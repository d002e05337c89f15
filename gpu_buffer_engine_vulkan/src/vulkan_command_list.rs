/// VulkanCommandRecorder - single-shot command buffer recording copies and
/// buffer barriers

use gpu_buffer_engine::gpubuf::{Error, Result};
use gpu_buffer_engine::gpubuf::device::{
    AccessFlags, BufferHandle, CommandRecorder, PipelineStages, SyncBarrier, TransferDescriptor,
};
use gpu_buffer_engine::engine_warn;
use ash::vk;
use slotmap::SlotMap;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_context::GpuContext;

pub(crate) type BufferTable = Arc<Mutex<SlotMap<BufferHandle, VulkanBuffer>>>;

/// Command buffer allocated from the upload pool, begun with ONE_TIME_SUBMIT
pub(crate) struct VulkanCommandRecorder {
    ctx: Arc<GpuContext>,
    buffers: BufferTable,
    /// `None` once handed over to `submit_single_shot`
    command_buffer: Option<vk::CommandBuffer>,
    recorded: usize,
}

impl VulkanCommandRecorder {
    pub(crate) fn begin(ctx: Arc<GpuContext>, buffers: BufferTable) -> Result<Self> {
        unsafe {
            let command_buffer = {
                let pool = lock(&ctx.upload_command_pool);
                let allocate_info = vk::CommandBufferAllocateInfo::default()
                    .command_pool(*pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1);

                let command_buffers = ctx.device.allocate_command_buffers(&allocate_info)
                    .map_err(|e| Error::BackendError(format!("vkAllocateCommandBuffers failed: {:?}", e)))?;
                command_buffers.into_iter().next()
                    .ok_or_else(|| Error::BackendError("vkAllocateCommandBuffers returned nothing".to_string()))?
            };

            let recorder = Self {
                ctx,
                buffers,
                command_buffer: Some(command_buffer),
                recorded: 0,
            };

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            // On error, dropping `recorder` returns the command buffer to the pool
            recorder.ctx.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("vkBeginCommandBuffer failed: {:?}", e)))?;

            Ok(recorder)
        }
    }

    /// Take ownership of the raw command buffer for submission
    pub(crate) fn take_command_buffer(&mut self) -> Result<vk::CommandBuffer> {
        self.command_buffer
            .take()
            .ok_or_else(|| Error::SubmitError("command buffer already submitted".to_string()))
    }

    fn active(&self) -> Result<vk::CommandBuffer> {
        self.command_buffer
            .ok_or_else(|| Error::InvalidResource("recording into a submitted command buffer".to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn resolve(table: &SlotMap<BufferHandle, VulkanBuffer>, handle: BufferHandle) -> Result<(vk::Buffer, u64)> {
    table
        .get(handle)
        .map(|b| (b.buffer, b.size))
        .ok_or_else(|| Error::InvalidResource(format!("unknown buffer handle {:?}", handle)))
}

fn check_range(what: &str, offset: u64, size: u64, capacity: u64) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Error::InvalidResource(format!(
            "{} range [{}, +{}) exceeds buffer of {} bytes", what, offset, size, capacity
        ))),
    }
}

impl CommandRecorder for VulkanCommandRecorder {
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: &TransferDescriptor) -> Result<()> {
        let command_buffer = self.active()?;
        let (src_buffer, dst_buffer) = {
            let table = lock(&self.buffers);
            let (src_buffer, src_size) = resolve(&table, src)?;
            let (dst_buffer, dst_size) = resolve(&table, dst)?;
            check_range("copy source", region.src_offset, region.size, src_size)?;
            check_range("copy destination", region.dst_offset, region.size, dst_size)?;
            (src_buffer, dst_buffer)
        };

        let copy = vk::BufferCopy::default()
            .src_offset(region.src_offset)
            .dst_offset(region.dst_offset)
            .size(region.size);
        unsafe {
            self.ctx.device.cmd_copy_buffer(command_buffer, src_buffer, dst_buffer, &[copy]);
        }
        self.recorded += 1;
        Ok(())
    }

    fn buffer_barrier(&mut self, barrier: &SyncBarrier) -> Result<()> {
        let command_buffer = self.active()?;
        let buffer = {
            let table = lock(&self.buffers);
            let (buffer, size) = resolve(&table, barrier.buffer)?;
            check_range("barrier", barrier.offset, barrier.size, size)?;
            buffer
        };

        let memory_barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(access_to_vk(barrier.src_access))
            .dst_access_mask(access_to_vk(barrier.dst_access))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(buffer)
            .offset(barrier.offset)
            .size(barrier.size);

        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                command_buffer,
                stages_to_vk(barrier.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE),
                stages_to_vk(barrier.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
                vk::DependencyFlags::empty(),
                &[],
                &[memory_barrier],
                &[],
            );
        }
        self.recorded += 1;
        Ok(())
    }

    fn recorded_count(&self) -> usize {
        self.recorded
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl Drop for VulkanCommandRecorder {
    fn drop(&mut self) {
        if let Some(command_buffer) = self.command_buffer.take() {
            engine_warn!("gpubuf::vulkan", "freeing single-shot command buffer that was never submitted");
            let pool = lock(&self.ctx.upload_command_pool);
            unsafe {
                self.ctx.device.free_command_buffers(*pool, &[command_buffer]);
            }
        }
    }
}

/// Pipeline stages as Vulkan stage flags, `empty` when none are set
pub(crate) fn stages_to_vk(stages: PipelineStages, empty: vk::PipelineStageFlags) -> vk::PipelineStageFlags {
    const TABLE: [(PipelineStages, vk::PipelineStageFlags); 7] = [
        (PipelineStages::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStages::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStages::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStages::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (PipelineStages::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (PipelineStages::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStages::HOST, vk::PipelineStageFlags::HOST),
    ];
    let flags = TABLE
        .iter()
        .filter(|(stage, _)| stages.contains(*stage))
        .fold(vk::PipelineStageFlags::empty(), |acc, (_, vk_stage)| acc | *vk_stage);
    if flags.is_empty() { empty } else { flags }
}

/// Access kinds as Vulkan access flags
pub(crate) fn access_to_vk(access: AccessFlags) -> vk::AccessFlags {
    const TABLE: [(AccessFlags, vk::AccessFlags); 8] = [
        (AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ),
        (AccessFlags::VERTEX_ATTRIBUTE_READ, vk::AccessFlags::VERTEX_ATTRIBUTE_READ),
        (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
        (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
        (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
        (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
        (AccessFlags::HOST_READ, vk::AccessFlags::HOST_READ),
        (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
    ];
    TABLE
        .iter()
        .filter(|(kind, _)| access.contains(*kind))
        .fold(vk::AccessFlags::empty(), |acc, (_, vk_access)| acc | *vk_access)
}
