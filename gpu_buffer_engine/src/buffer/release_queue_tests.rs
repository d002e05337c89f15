/// Unit tests for ReleaseQueue

use std::sync::{Arc, Mutex};

use serial_test::serial;

use crate::buffer::{BufferKind, GpuResource, ReleaseQueue, StagedBuffer};
use crate::device::mock_device::MockDevice;
use crate::device::GraphicsDevice;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::log::LogSeverity;
use crate::log_capture::CaptureLogger;

struct Tracked {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl GpuResource for Tracked {
    fn cleanup(&mut self) -> Result<()> {
        self.log.lock().unwrap().push(self.name.clone());
        if self.fail {
            Err(Error::BackendError(format!("{} refused", self.name)))
        } else {
            Ok(())
        }
    }

    fn label(&self) -> &str {
        &self.name
    }
}

fn tracked(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Tracked {
    Tracked { name: name.to_string(), log: log.clone(), fail }
}

#[test]
fn test_flush_releases_in_order_exactly_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut queue = ReleaseQueue::new();
    queue.defer(tracked("a", &log, false));
    queue.defer(tracked("b", &log, false));
    assert_eq!(queue.len(), 2);

    let report = queue.flush();
    assert_eq!(report.released, 2);
    assert!(report.is_clean());
    assert!(queue.is_empty());

    // Second flush has nothing left to release
    assert_eq!(queue.flush().released, 0);
    assert_eq!(*log.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_failures_are_collected_and_do_not_stop_the_flush() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut queue = ReleaseQueue::new();
    queue.defer(tracked("ok", &log, false));
    queue.defer(tracked("broken", &log, true));
    queue.defer(tracked("after", &log, false));

    let report = queue.flush();
    assert_eq!(report.released, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "broken");
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[test]
fn test_deferred_buffers_are_freed_on_flush() {
    let device = Arc::new(MockDevice::new());
    let mut buffer = StagedBuffer::new(device.clone(), BufferKind::Vertex, "mesh");
    buffer.upload_data(&[1, 2, 3, 4]).unwrap();

    let mut queue = ReleaseQueue::new();
    queue.defer(buffer);
    assert_eq!(device.memory_report().live_buffers, 2);

    assert!(queue.flush().is_clean());
    assert!(device.memory_report().is_empty());
}

#[test]
#[serial]
fn test_drop_with_pending_warns() {
    let capture = CaptureLogger::install();
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let mut queue = ReleaseQueue::new();
        queue.defer(tracked("leaked", &log, false));
    }
    assert!(capture.contains(LogSeverity::Warn, "never flushed"));
    Engine::reset_logger();
}
