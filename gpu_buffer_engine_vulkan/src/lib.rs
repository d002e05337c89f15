/*!
# GPU Buffer Engine - Vulkan Backend

Headless Vulkan implementation of the `gpu_buffer_engine` device traits,
built on Ash for the Vulkan bindings and gpu-allocator for memory
management.

```no_run
use std::sync::Arc;
use gpu_buffer_engine::gpubuf::Config;
use gpu_buffer_engine::gpubuf::buffer::IndexBuffer;
use gpu_buffer_engine::gpubuf::device::GraphicsDevice;
use gpu_buffer_engine_vulkan::VulkanDevice;

# fn main() -> gpu_buffer_engine::gpubuf::Result<()> {
let device: Arc<dyn GraphicsDevice> = Arc::new(VulkanDevice::new(Config::default())?);
let mut indices = IndexBuffer::new(device.clone(), "quad indices");
indices.upload_indices(&[0, 1, 2, 2, 3, 0])?;
indices.cleanup()?;
# Ok(())
# }
```
*/

mod vulkan_context;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_device;
mod debug;

pub use vulkan_device::VulkanDevice;

// Validation statistics (populated when built with `vulkan-validation`)
pub use debug::{get_validation_stats, print_validation_stats_report};
