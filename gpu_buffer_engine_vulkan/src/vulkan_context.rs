/// GpuContext - Vulkan objects shared by the device and every raw buffer
///
/// Owns nothing it destroys itself: `VulkanDevice::drop` tears the objects
/// down in dependency order (allocator before device, messenger before
/// instance).

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use std::mem::ManuallyDrop;
use std::sync::Mutex;

pub(crate) struct GpuContext {
    pub instance: ash::Instance,
    pub device: ash::Device,
    /// Dropped explicitly before `device` is destroyed
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    /// Transient pool every single-shot command buffer comes from
    /// (TRANSIENT + RESET_COMMAND_BUFFER)
    pub upload_command_pool: Mutex<vk::CommandPool>,
    /// Signaled by each single-shot submit, waited on and reset right after
    pub upload_fence: vk::Fence,
    pub debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}
