/// All GPU buffers of one skinned model: mesh vertex/index buffers plus the
/// bone-parent, bone-offset and animation-lookup storage buffers

use std::sync::Arc;

use glam::{Mat4, Vec4};

use crate::buffer::{GpuResource, ShaderStorageBuffer, UploadPayload};
use crate::device::GraphicsDevice;
use crate::error::{Error, Result};
use crate::model::{MeshBuffers, MeshData};
use crate::{engine_error, engine_info, engine_warn};

/// CPU-side model data handed over by the importer
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub meshes: Vec<MeshData>,
    /// Parent index of every bone, -1 for the root
    pub bone_parents: Vec<i32>,
    pub bone_offsets: Vec<Mat4>,
    /// Per-clip, per-bone lookup entries sampled by the animation shader
    pub anim_lookup: Vec<Vec4>,
}

pub struct ModelBuffers {
    name: String,
    meshes: Vec<MeshBuffers>,
    bone_parents: ShaderStorageBuffer,
    bone_offsets: ShaderStorageBuffer,
    anim_lookup: ShaderStorageBuffer,
}

impl ModelBuffers {
    /// Upload every buffer of `model`
    ///
    /// # Errors
    ///
    /// The first failure. Everything allocated before it is released, so a
    /// failed load leaves nothing behind on the device.
    pub fn load(device: &Arc<dyn GraphicsDevice>, name: impl Into<String>, model: &ModelData) -> Result<Self> {
        let name = name.into();

        let mut meshes = Vec::with_capacity(model.meshes.len());
        for (i, mesh) in model.meshes.iter().enumerate() {
            match MeshBuffers::load(device, format!("{} mesh {}", name, i), mesh) {
                Ok(buffers) => meshes.push(buffers),
                Err(e) => return Err(Self::abort(&name, e, &mut meshes, &mut [])),
            }
        }

        let mut bone_parents =
            match Self::storage(device, &name, "bone parents", UploadPayload::Ints(&model.bone_parents)) {
                Ok(buffer) => buffer,
                Err(e) => return Err(Self::abort(&name, e, &mut meshes, &mut [])),
            };
        let mut bone_offsets =
            match Self::storage(device, &name, "bone offsets", UploadPayload::Matrices(&model.bone_offsets)) {
                Ok(buffer) => buffer,
                Err(e) => return Err(Self::abort(&name, e, &mut meshes, &mut [&mut bone_parents])),
            };
        let anim_lookup =
            match Self::storage(device, &name, "anim lookup", UploadPayload::Vec4s(&model.anim_lookup)) {
                Ok(buffer) => buffer,
                Err(e) => {
                    return Err(Self::abort(&name, e, &mut meshes, &mut [&mut bone_parents, &mut bone_offsets]))
                }
            };

        engine_info!(
            "gpubuf::Model",
            "{}: loaded {} mesh(es), {} bone(s)",
            name, meshes.len(), model.bone_offsets.len()
        );
        Ok(Self { name, meshes, bone_parents, bone_offsets, anim_lookup })
    }

    /// Release every buffer of the model
    ///
    /// All buffers are released even if one fails; the first error is returned.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for mesh in &mut self.meshes {
            if let Err(e) = mesh.cleanup() {
                first_error.get_or_insert(e);
            }
        }
        for storage in [&mut self.bone_parents, &mut self.bone_offsets, &mut self.anim_lookup] {
            if let Err(e) = storage.cleanup() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => {
                engine_error!("gpubuf::Model", "{}: cleanup failed: {}", self.name, e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meshes(&self) -> &[MeshBuffers] {
        &self.meshes
    }

    pub fn bone_parent_buffer(&self) -> &ShaderStorageBuffer {
        &self.bone_parents
    }

    pub fn bone_offset_buffer(&self) -> &ShaderStorageBuffer {
        &self.bone_offsets
    }

    pub fn anim_lookup_buffer(&self) -> &ShaderStorageBuffer {
        &self.anim_lookup
    }

    /// Staged storage buffer sized for `payload` (at least the default size)
    fn storage(
        device: &Arc<dyn GraphicsDevice>,
        model: &str,
        label: &str,
        payload: UploadPayload<'_>,
    ) -> Result<ShaderStorageBuffer> {
        let size = payload.byte_len().max(device.default_buffer_size());
        let mut buffer = ShaderStorageBuffer::init(device.clone(), format!("{} {}", model, label), size)?;
        if let Err(e) = buffer.upload_payload(&payload) {
            if let Err(cleanup_err) = buffer.cleanup() {
                engine_warn!("gpubuf::Model", "{} {}: cleanup after failed upload reported: {}", model, label, cleanup_err);
            }
            return Err(e);
        }
        Ok(buffer)
    }

    /// Release what a failed load allocated and hand back the original error
    fn abort(
        name: &str,
        error: Error,
        meshes: &mut [MeshBuffers],
        storage: &mut [&mut ShaderStorageBuffer],
    ) -> Error {
        engine_error!("gpubuf::Model", "{}: model load failed: {}", name, error);
        for mesh in meshes.iter_mut() {
            mesh.release_after_failure();
        }
        for buffer in storage.iter_mut() {
            if let Err(e) = buffer.cleanup() {
                engine_warn!("gpubuf::Model", "{}: cleanup of '{}' reported: {}", name, buffer.name(), e);
            }
        }
        error
    }
}

impl GpuResource for ModelBuffers {
    fn cleanup(&mut self) -> Result<()> {
        ModelBuffers::cleanup(self)
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
#[path = "model_buffers_tests.rs"]
mod tests;
