/// VulkanDevice - headless Vulkan implementation of GraphicsDevice

use gpu_buffer_engine::gpubuf::{Config, Error, Result};
use gpu_buffer_engine::gpubuf::device::{
    BufferDesc, BufferHandle, CommandRecorder, GraphicsDevice, MappedMemory, MemoryReport, QueueId,
};
use gpu_buffer_engine::{engine_bail, engine_debug, engine_error, engine_info, engine_warn};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;
use slotmap::SlotMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::{BufferTable, VulkanCommandRecorder};
use crate::vulkan_context::GpuContext;

/// Vulkan device owning the instance, the logical device, the allocator and
/// every raw buffer handed out through `GraphicsDevice`
///
/// No surface or swapchain: the buffer engine only needs a graphics queue
/// for transfers.
pub struct VulkanDevice {
    /// Keeps the Vulkan loader alive until the instance is destroyed
    _entry: ash::Entry,
    ctx: Arc<GpuContext>,
    buffers: BufferTable,
    physical_device_name: String,
    leak_check: bool,
    default_buffer_size: u64,
}

/// Init helper: destroys what was created so far unless disarmed
struct PartialInit<'a> {
    instance: &'a ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    device: Option<ash::Device>,
    armed: bool,
}

impl Drop for PartialInit<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        unsafe {
            if let Some(device) = &self.device {
                device.destroy_device(None);
            }
            if let Some((loader, messenger)) = &self.debug {
                crate::debug::shutdown_validation();
                loader.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn init_failed(what: &str, e: impl std::fmt::Debug) -> Error {
    engine_error!("gpubuf::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VulkanDevice {
    /// Create a headless Vulkan device
    ///
    /// Validation layers and the debug messenger are only set up when the
    /// crate is built with the `vulkan-validation` feature and
    /// `config.enable_validation` is set.
    pub fn new(config: Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| init_failed("Failed to load Vulkan library", e))?;

            let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;
            if config.enable_validation && !validation {
                engine_warn!("gpubuf::vulkan", "Validation requested but the vulkan-validation feature is disabled");
            }

            let app_name = CString::new(config.app_name.clone())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"GPU Buffer Engine")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let extension_names = if validation {
                vec![ash::ext::debug_utils::NAME.as_ptr()]
            } else {
                vec![]
            };
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;

            let mut partial = PartialInit { instance: &instance, debug: None, device: None, armed: true };

            if validation {
                partial.debug = Some(Self::create_debug_messenger(&entry, &instance, &config)?);
            }

            let (physical_device, graphics_family_index, physical_device_name) =
                Self::pick_physical_device(&instance)?;

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .queue_priorities(&queue_priorities)];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos);

            let device = instance.create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_failed("Failed to create logical device", e))?;
            partial.device = Some(device.clone());

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: AllocatorDebugSettings {
                    log_leaks_on_shutdown: config.allocator_leak_check,
                    ..Default::default()
                },
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_failed("Failed to create GPU allocator", e))?;

            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family_index)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device.create_command_pool(&pool_create_info, None)
                .map_err(|e| init_failed("Failed to create upload command pool", e))?;

            let upload_fence = match device.create_fence(&vk::FenceCreateInfo::default(), None) {
                Ok(fence) => fence,
                Err(e) => {
                    device.destroy_command_pool(upload_command_pool, None);
                    return Err(init_failed("Failed to create upload fence", e));
                }
            };

            // From here on VulkanDevice::drop owns teardown
            partial.armed = false;
            let (debug_utils_loader, debug_messenger) = match partial.debug.take() {
                Some((loader, messenger)) => (Some(loader), Some(messenger)),
                None => (None, None),
            };
            drop(partial);

            engine_info!("gpubuf::vulkan", "Vulkan device ready on '{}' (queue family {})", physical_device_name, graphics_family_index);

            Ok(Self {
                _entry: entry,
                ctx: Arc::new(GpuContext {
                    instance,
                    device,
                    allocator: ManuallyDrop::new(Mutex::new(allocator)),
                    graphics_queue,
                    graphics_queue_family: graphics_family_index,
                    upload_command_pool: Mutex::new(upload_command_pool),
                    upload_fence,
                    debug_utils_loader,
                    debug_messenger,
                }),
                buffers: Arc::new(Mutex::new(SlotMap::with_key())),
                physical_device_name,
                leak_check: config.allocator_leak_check,
                default_buffer_size: config.default_buffer_size,
            })
        }
    }

    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        crate::debug::init_validation(crate::debug::ValidationConfig {
            severity: config.debug_severity,
            output: config.debug_output.clone(),
            message_filter: config.debug_message_filter,
            break_on_error: config.break_on_validation_error,
            panic_on_error: config.panic_on_error,
            enable_stats: config.enable_validation_stats,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::messenger_severity(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                crate::debug::shutdown_validation();
                init_failed("Failed to create debug messenger", e)
            })?;
        Ok((debug_utils, messenger))
    }

    /// First physical device exposing a graphics queue family
    unsafe fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, String)> {
        let physical_devices = instance.enumerate_physical_devices()
            .map_err(|e| init_failed("Failed to enumerate physical devices", e))?;

        physical_devices
            .into_iter()
            .find_map(|physical_device| {
                let family = instance
                    .get_physical_device_queue_family_properties(physical_device)
                    .iter()
                    .position(|qf| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))?;
                let properties = instance.get_physical_device_properties(physical_device);
                let name = properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "unknown device".to_string());
                Some((physical_device, family as u32, name))
            })
            .ok_or_else(|| {
                engine_error!("gpubuf::vulkan", "No Vulkan device with a graphics queue found");
                Error::InitializationFailed("No Vulkan device with a graphics queue found".to_string())
            })
    }

    /// Name reported by the driver for the selected GPU
    pub fn physical_device_name(&self) -> &str {
        &self.physical_device_name
    }

    unsafe fn run_single_shot(&self, command_buffer: vk::CommandBuffer) -> std::result::Result<(), String> {
        let device = &self.ctx.device;
        device.end_command_buffer(command_buffer)
            .map_err(|e| format!("vkEndCommandBuffer failed: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        device.queue_submit(self.ctx.graphics_queue, &[submit_info], self.ctx.upload_fence)
            .map_err(|e| format!("vkQueueSubmit failed: {:?}", e))?;

        // Wait forever: an upload has no timeout
        let waited = device.wait_for_fences(&[self.ctx.upload_fence], true, u64::MAX)
            .map_err(|e| format!("vkWaitForFences failed: {:?}", e));
        // The fence must be unsignaled for the next submit even after a failed wait
        let reset = device.reset_fences(&[self.ctx.upload_fence])
            .map_err(|e| format!("vkResetFences failed: {:?}", e));
        waited.and(reset)
    }
}

impl GraphicsDevice for VulkanDevice {
    fn allocate_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        if desc.size == 0 {
            engine_bail!("gpubuf::vulkan", "allocate_buffer: '{}' has zero size", desc.name);
        }
        let buffer = VulkanBuffer::create(&self.ctx, desc)?;
        let handle = lock(&self.buffers).insert(buffer);
        engine_debug!("gpubuf::vulkan", "Allocated '{}' ({} bytes, {:?})", desc.name, desc.size, desc.location);
        Ok(handle)
    }

    fn map_buffer(&self, buffer: BufferHandle) -> Result<MappedMemory> {
        lock(&self.buffers)
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource(format!("map of unknown buffer {:?}", buffer)))?
            .map()
    }

    fn unmap_buffer(&self, buffer: BufferHandle) -> Result<()> {
        lock(&self.buffers)
            .get_mut(buffer)
            .ok_or_else(|| Error::InvalidResource(format!("unmap of unknown buffer {:?}", buffer)))?
            .unmap()
    }

    fn free_buffer(&self, buffer: BufferHandle) -> Result<()> {
        let removed = lock(&self.buffers)
            .remove(buffer)
            .ok_or_else(|| Error::InvalidResource(format!("free of unknown buffer {:?}", buffer)))?;
        engine_debug!("gpubuf::vulkan", "Freed '{}' ({} bytes)", removed.name, removed.size);
        removed.destroy(&self.ctx);
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Result<u64> {
        lock(&self.buffers)
            .get(buffer)
            .map(|b| b.size)
            .ok_or_else(|| Error::InvalidResource(format!("size of unknown buffer {:?}", buffer)))
    }

    fn graphics_queue(&self) -> QueueId {
        QueueId(self.ctx.graphics_queue_family)
    }

    fn create_single_shot_commands(&self) -> Result<Box<dyn CommandRecorder>> {
        let recorder = VulkanCommandRecorder::begin(Arc::clone(&self.ctx), Arc::clone(&self.buffers))
            .map_err(|e| {
                engine_error!("gpubuf::vulkan", "Failed to begin single-shot command buffer: {}", e);
                e
            })?;
        Ok(Box::new(recorder))
    }

    fn submit_single_shot(&self, commands: Box<dyn CommandRecorder>, queue: QueueId) -> Result<()> {
        if queue != self.graphics_queue() {
            return Err(Error::SubmitError(format!("unknown queue {:?}", queue)));
        }
        let mut recorder = commands
            .into_any()
            .downcast::<VulkanCommandRecorder>()
            .map_err(|_| Error::SubmitError("command recorder was not created by this device".to_string()))?;
        let command_buffer = recorder.take_command_buffer()?;

        // The pool lock also serializes use of the single upload fence
        let pool = lock(&self.ctx.upload_command_pool);
        let result = unsafe { self.run_single_shot(command_buffer) };
        unsafe {
            self.ctx.device.free_command_buffers(*pool, &[command_buffer]);
        }
        drop(pool);

        result.map_err(|message| {
            engine_error!("gpubuf::vulkan", "Single-shot submit failed: {}", message);
            Error::SubmitError(message)
        })
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| Error::BackendError(format!("vkDeviceWaitIdle failed: {:?}", e)))
        }
    }

    fn memory_report(&self) -> MemoryReport {
        let buffers = lock(&self.buffers);
        MemoryReport {
            live_buffers: buffers.len(),
            live_bytes: buffers.values().map(|b| b.size).sum(),
        }
    }

    fn default_buffer_size(&self) -> u64 {
        self.default_buffer_size
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            // 1. Buffers nobody cleaned up
            let leftovers: Vec<VulkanBuffer> = lock(&self.buffers).drain().map(|(_, b)| b).collect();
            for buffer in leftovers {
                if self.leak_check {
                    engine_warn!("gpubuf::vulkan", "Buffer '{}' ({} bytes) still alive at device destruction", buffer.name, buffer.size);
                }
                buffer.destroy(&self.ctx);
            }

            // 2. Device-owned objects
            {
                let mut pool = lock(&self.ctx.upload_command_pool);
                if *pool != vk::CommandPool::null() {
                    self.ctx.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }
            self.ctx.device.destroy_fence(self.ctx.upload_fence, None);

            // 3. Allocator frees its memory blocks, needs the device alive
            let Some(ctx) = Arc::get_mut(&mut self.ctx) else {
                engine_error!("gpubuf::vulkan", "Command recorder outlived its device, leaking the Vulkan device");
                return;
            };
            ManuallyDrop::drop(&mut ctx.allocator);

            // 4. No callbacks during teardown
            crate::debug::shutdown_validation();
            if let (Some(debug_utils), Some(messenger)) = (&ctx.debug_utils_loader, &ctx.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            // 5. Device and instance
            ctx.device.destroy_device(None);
            ctx.instance.destroy_instance(None);
        }
    }
}
