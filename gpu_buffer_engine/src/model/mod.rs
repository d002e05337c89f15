/// Model-level consumers of the buffer engine
///
/// Loading is all or nothing: when any upload fails, everything allocated so
/// far is released and the error is returned, so no half-filled buffer is
/// ever reachable from the draw path.

pub mod mesh_buffers;
pub mod model_buffers;
pub mod instance_buffer;

pub use mesh_buffers::{MeshBuffers, MeshData};
pub use model_buffers::{ModelBuffers, ModelData};
pub use instance_buffer::InstanceBuffer;
