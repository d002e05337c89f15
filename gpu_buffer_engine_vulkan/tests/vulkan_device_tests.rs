//! Integration tests for VulkanDevice and the buffer engine on a real GPU
//!
//! All tests require a Vulkan driver and are marked with #[ignore].
//!
//! Run with: cargo test -p gpu_buffer_engine_vulkan --test vulkan_device_tests -- --ignored


use glam::{Mat4, Vec3, Vec4};
use gpu_buffer_engine::gpubuf::buffer::{
    BufferKind, CoherentBuffer, IndexBuffer, ShaderStorageBuffer, StagedBuffer, Vertex, VertexBuffer,
};
use gpu_buffer_engine::gpubuf::device::{
    BufferDesc, BufferUsage, GraphicsDevice, MemoryLocation, SyncBarrier, TransferDescriptor,
};
use gpu_buffer_engine::gpubuf::model::{InstanceBuffer, MeshData, ModelBuffers, ModelData};
use gpu_buffer_engine_vulkan::get_validation_stats;
use gpu_test_utils::{get_test_device, get_test_vulkan_device};
use serial_test::serial;

// ============================================================================
// RAW DEVICE
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_allocate_and_free() {
    let device = get_test_device();
    let before = device.memory_report();

    let handle = device
        .allocate_buffer(&BufferDesc {
            name: "raw".to_string(),
            size: 4096,
            usage: BufferUsage::STORAGE | BufferUsage::TRANSFER_DST,
            location: MemoryLocation::GpuOnly,
        })
        .unwrap();
    assert_eq!(device.buffer_size(handle).unwrap(), 4096);
    assert_eq!(device.memory_report().live_buffers, before.live_buffers + 1);

    device.free_buffer(handle).unwrap();
    assert_eq!(device.memory_report(), before);
    assert!(device.free_buffer(handle).is_err());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_local_memory_cannot_be_mapped() {
    let device = get_test_device();
    let handle = device
        .allocate_buffer(&BufferDesc {
            name: "device local".to_string(),
            size: 256,
            usage: BufferUsage::VERTEX,
            location: MemoryLocation::GpuOnly,
        })
        .unwrap();

    assert!(device.map_buffer(handle).unwrap_err().is_map());
    device.free_buffer(handle).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_single_shot_copy() {
    let device = get_test_device();
    let desc = |name: &str, usage, location| BufferDesc { name: name.to_string(), size: 64, usage, location };
    let src = device.allocate_buffer(&desc("src", BufferUsage::TRANSFER_SRC, MemoryLocation::CpuToGpu)).unwrap();
    let dst = device.allocate_buffer(&desc("dst", BufferUsage::TRANSFER_DST, MemoryLocation::GpuToCpu)).unwrap();

    let payload: Vec<u8> = (0..64).collect();
    let mut mapping = device.map_buffer(src).unwrap();
    mapping.write(0, &payload).unwrap();
    device.unmap_buffer(src).unwrap();

    let mut commands = device.create_single_shot_commands().unwrap();
    commands.copy_buffer(src, dst, &TransferDescriptor::whole(64)).unwrap();
    commands.buffer_barrier(&SyncBarrier::readback_to_host(dst, 64)).unwrap();
    assert_eq!(commands.recorded_count(), 2);
    device.submit_single_shot(commands, device.graphics_queue()).unwrap();

    let mapping = device.map_buffer(dst).unwrap();
    let mut out = vec![0u8; 64];
    mapping.read(0, &mut out).unwrap();
    device.unmap_buffer(dst).unwrap();
    assert_eq!(out, payload);

    device.free_buffer(src).unwrap();
    device.free_buffer(dst).unwrap();
}

// ============================================================================
// STAGED BUFFERS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_staged_upload_reads_back() {
    let device = get_test_device();
    let mut indices = IndexBuffer::new(device.clone(), "quad indices");

    indices.upload_indices(&[0, 1, 2, 2, 3, 0]).unwrap();
    assert_eq!(indices.capacity(), 1024);

    let bytes = indices.staged().read_back(0, 24).unwrap();
    assert_eq!(bytemuck::cast_slice::<u8, u32>(&bytes), &[0, 1, 2, 2, 3, 0]);
    indices.cleanup().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_upload_grows_to_exact_size() {
    let device = get_test_device();
    let mut vertices = VertexBuffer::new(device.clone(), "grid");
    vertices.upload_vertices(&[Vertex::default(); 4]).unwrap();
    assert_eq!(vertices.capacity(), 1024);

    let grid: Vec<Vertex> = (0..100)
        .map(|i| Vertex { position: Vec4::new(i as f32, 0.0, 0.0, 1.0), ..Vertex::default() })
        .collect();
    vertices.upload_vertices(&grid).unwrap();
    assert_eq!(vertices.capacity(), 100 * std::mem::size_of::<Vertex>() as u64);

    let last = vertices.staged().read_back(99 * 80, 80).unwrap();
    assert_eq!(bytemuck::pod_read_unaligned::<Vertex>(&last).position.x, 99.0);
    vertices.cleanup().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_check_for_resize_without_upload() {
    let device = get_test_device();
    let mut staged = StagedBuffer::new(device.clone(), BufferKind::Storage, "scratch");
    staged.init(1024).unwrap();

    assert!(!staged.check_for_resize(512).unwrap());
    assert!(staged.check_for_resize(8192).unwrap());
    assert_eq!(staged.capacity(), 8192);
    staged.cleanup().unwrap();
    assert!(staged.cleanup().is_err());
}

// ============================================================================
// STORAGE / COHERENT BUFFERS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_ssbo_matrix_readback() {
    let device = get_test_device();
    let matrices: Vec<Mat4> = (0..8).map(|i| Mat4::from_scale(Vec3::splat(i as f32 + 1.0))).collect();

    let mut ssbo = ShaderStorageBuffer::init(device.clone(), "bone offsets", 1024).unwrap();
    ssbo.upload_mat4s(&matrices).unwrap();
    assert_eq!(ssbo.get_ssbo_data_mat4(5 * 64).unwrap(), matrices[5]);
    ssbo.cleanup().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_coherent_buffer_skips_submission() {
    let device = get_test_device();
    let mut coherent = CoherentBuffer::new(device.clone(), BufferKind::Storage, "per-frame");
    coherent.init_coherent(256).unwrap();

    coherent.upload_data(&[7u8; 200]).unwrap();
    coherent.write_at(200, &[9u8; 56]).unwrap();
    let bytes = coherent.read_back(196, 8).unwrap();
    assert_eq!(bytes, vec![7, 7, 7, 7, 9, 9, 9, 9]);

    coherent.upload_data(&[1u8; 600]).unwrap();
    assert_eq!(coherent.capacity(), 600);
    coherent.cleanup().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_instance_buffer() {
    let device = get_test_device();
    let mut instances = InstanceBuffer::new(device.clone(), "instances").unwrap();
    let matrices: Vec<Mat4> = (0..32).map(|i| Mat4::from_translation(Vec3::X * i as f32)).collect();

    instances.update(&matrices).unwrap();
    assert_eq!(instances.matrix(31).unwrap(), matrices[31]);
    instances.cleanup().unwrap();
}

// ============================================================================
// MODEL LOADING / LEAKS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_model_load_and_cleanup_leaves_no_allocations() {
    let vulkan = get_test_vulkan_device();
    let device = get_test_device();
    let before = vulkan.memory_report();

    let model = ModelData {
        meshes: vec![MeshData { vertices: vec![Vertex::default(); 3], indices: vec![0, 1, 2] }],
        bone_parents: vec![-1, 0, 1],
        bone_offsets: vec![Mat4::IDENTITY; 3],
        anim_lookup: vec![Vec4::ONE; 6],
    };
    let mut buffers = ModelBuffers::load(&device, "triangle", &model).unwrap();
    assert_eq!(vulkan.memory_report().live_buffers, before.live_buffers + 10);

    buffers.cleanup().unwrap();
    assert_eq!(vulkan.memory_report(), before);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_no_validation_errors() {
    let device = get_test_device();
    let mut indices = IndexBuffer::new(device.clone(), "validated");
    indices.upload_indices(&(0..1000).collect::<Vec<u32>>()).unwrap();
    indices.cleanup().unwrap();

    assert_eq!(get_validation_stats().errors, 0);
}
