/// Unit tests for InstanceBuffer

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::device::mock_device::MockDevice;
use crate::device::GraphicsDevice;
use crate::error::Error;
use crate::model::InstanceBuffer;

fn translations(count: usize) -> Vec<Mat4> {
    (0..count).map(|i| Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0))).collect()
}

#[test]
fn test_update_writes_without_submitting() {
    let device = Arc::new(MockDevice::new());
    let mut instances = InstanceBuffer::new(device.clone(), "soldier instances").unwrap();

    instances.update(&translations(4)).unwrap();

    assert_eq!(instances.instance_count(), 4);
    assert_eq!(instances.matrix(3).unwrap(), Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0)));
    assert_eq!(device.submit_count(), 0);
    instances.cleanup().unwrap();
    assert!(device.memory_report().is_empty());
}

#[test]
fn test_more_instances_grow_the_buffer() {
    let device = Arc::new(MockDevice::new());
    let mut instances = InstanceBuffer::new(device.clone(), "crowd").unwrap();
    assert_eq!(instances.capacity(), 1024);

    instances.update(&translations(100)).unwrap();
    assert_eq!(instances.capacity(), 6400);
    assert_eq!(instances.matrix(99).unwrap(), Mat4::from_translation(Vec3::new(99.0, 0.0, 0.0)));

    // Fewer instances next frame keep the larger buffer
    instances.update(&translations(2)).unwrap();
    assert_eq!(instances.capacity(), 6400);
    assert_eq!(instances.instance_count(), 2);
    instances.cleanup().unwrap();
}

#[test]
fn test_matrix_past_capacity_fails() {
    let device = Arc::new(MockDevice::new());
    let mut instances = InstanceBuffer::new(device.clone(), "few").unwrap();
    instances.update(&translations(1)).unwrap();

    assert!(instances.matrix(15).is_ok());
    assert!(instances.matrix(16).is_err());
    instances.cleanup().unwrap();
}

#[test]
fn test_matrix_with_huge_index_is_an_error() {
    let device = Arc::new(MockDevice::new());
    let mut instances = InstanceBuffer::new(device.clone(), "overflow").unwrap();
    instances.update(&translations(1)).unwrap();

    assert!(matches!(instances.matrix(usize::MAX), Err(Error::InvalidResource(_))));
    assert!(matches!(instances.matrix(usize::MAX / 64 + 1), Err(Error::InvalidResource(_))));
    instances.cleanup().unwrap();
}
