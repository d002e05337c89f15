/// Upload payloads: the element types buffers are filled with and a tagged
/// payload that funnels every one of them into the same byte path

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec4, Vec2, Vec4};

/// Skinned mesh vertex as read by the vertex shader (80 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec4,
    pub color: Vec4,
    pub normal: Vec4,
    pub bone_number: UVec4,
    pub bone_weight: Vec4,
}

/// Per-node animation transform (48 bytes)
///
/// `rotation` is a quaternion stored as `(x, y, z, w)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct NodeTransformData {
    pub translation: Vec4,
    pub scale: Vec4,
    pub rotation: Vec4,
}

/// Typed data for one upload
///
/// Every variant is plain-old-data, so each one reaches the GPU through the
/// same `as_bytes` view without per-type staging code.
#[derive(Debug, Clone, Copy)]
pub enum UploadPayload<'a> {
    Indices(&'a [u32]),
    Vertices(&'a [Vertex]),
    Matrices(&'a [Mat4]),
    Ints(&'a [i32]),
    NodeTransforms(&'a [NodeTransformData]),
    Vec2s(&'a [Vec2]),
    Vec4s(&'a [Vec4]),
    Raw(&'a [u8]),
}

impl<'a> UploadPayload<'a> {
    /// Payload bytes exactly as they will be copied
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            UploadPayload::Indices(d) => bytemuck::cast_slice(d),
            UploadPayload::Vertices(d) => bytemuck::cast_slice(d),
            UploadPayload::Matrices(d) => bytemuck::cast_slice(d),
            UploadPayload::Ints(d) => bytemuck::cast_slice(d),
            UploadPayload::NodeTransforms(d) => bytemuck::cast_slice(d),
            UploadPayload::Vec2s(d) => bytemuck::cast_slice(d),
            UploadPayload::Vec4s(d) => bytemuck::cast_slice(d),
            UploadPayload::Raw(d) => d,
        }
    }

    /// Size of one element in bytes
    pub fn stride(&self) -> usize {
        match self {
            UploadPayload::Indices(_) => std::mem::size_of::<u32>(),
            UploadPayload::Vertices(_) => std::mem::size_of::<Vertex>(),
            UploadPayload::Matrices(_) => std::mem::size_of::<Mat4>(),
            UploadPayload::Ints(_) => std::mem::size_of::<i32>(),
            UploadPayload::NodeTransforms(_) => std::mem::size_of::<NodeTransformData>(),
            UploadPayload::Vec2s(_) => std::mem::size_of::<Vec2>(),
            UploadPayload::Vec4s(_) => std::mem::size_of::<Vec4>(),
            UploadPayload::Raw(_) => 1,
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            UploadPayload::Indices(d) => d.len(),
            UploadPayload::Vertices(d) => d.len(),
            UploadPayload::Matrices(d) => d.len(),
            UploadPayload::Ints(d) => d.len(),
            UploadPayload::NodeTransforms(d) => d.len(),
            UploadPayload::Vec2s(d) => d.len(),
            UploadPayload::Vec4s(d) => d.len(),
            UploadPayload::Raw(d) => d.len(),
        }
    }

    /// Payload size in bytes
    pub fn byte_len(&self) -> u64 {
        (self.stride() * self.element_count()) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
