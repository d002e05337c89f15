/*!
# GPU Buffer Engine

Lifecycle and staged-upload engine for GPU index, vertex and shader-storage
buffers.

A buffer keeps a device-local destination and a host-visible staging buffer
of the same size. Uploads are copied into staging, transferred with a
single-shot command buffer and a barrier, and waited on before returning.
Buffers only grow, and always to exactly the size that was needed. Data
rewritten every frame can use a persistently mapped coherent buffer instead.

## Architecture

- **GraphicsDevice**: allocator adapter + single-shot submission trait,
  implemented by backends (see `gpu_buffer_engine_vulkan`)
- **StagedBuffer** / **CoherentBuffer**: the two upload paths
- **IndexBuffer**, **VertexBuffer**, **ShaderStorageBuffer**: typed wrappers
- **ReleaseQueue**: deferred destruction outside command recording
- **MeshBuffers**, **ModelBuffers**, **InstanceBuffer**: all-or-nothing
  model loading on top of the buffers

Everything public is reachable through the [`gpubuf`] namespace.
*/

// Internal modules
mod error;
mod engine;
mod config;
pub mod log;
pub mod device;
pub mod buffer;
pub mod model;

#[cfg(test)]
mod log_capture;

// Main gpubuf namespace module
pub mod gpubuf {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging facade
    pub use crate::engine::Engine;

    // Configuration
    pub use crate::config::{
        Config, DebugMessageFilter, DebugOutput, DebugSeverity, ValidationStats,
    };

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device traits and raw buffer types
    pub mod device {
        pub use crate::device::*;
    }

    // Buffer engine
    pub mod buffer {
        pub use crate::buffer::*;
    }

    // Model-level consumers
    pub mod model {
        pub use crate::model::*;
    }
}

// Re-export math library at crate root
pub use glam;
