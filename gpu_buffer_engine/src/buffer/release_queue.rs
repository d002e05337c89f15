/// Deferred release of GPU resources
///
/// A buffer must not be destroyed while a command buffer that references it
/// is being recorded. Owners push what they are done with and the frame loop
/// calls `flush` once recording is finished.

use crate::error::{Error, Result};
use crate::{engine_debug, engine_error, engine_warn};

/// Something holding device allocations that must be released explicitly
pub trait GpuResource: Send {
    /// Release every allocation. Called exactly once by its owner.
    fn cleanup(&mut self) -> Result<()>;

    /// Name used in logs
    fn label(&self) -> &str;
}

/// Outcome of a `ReleaseQueue::flush`
#[derive(Debug, Default)]
pub struct ReleaseReport {
    /// Resources whose cleanup ran (successfully or not)
    pub released: usize,
    /// Label and error of every cleanup that failed
    pub failures: Vec<(String, Error)>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resources waiting for a safe point to be destroyed
#[derive(Default)]
pub struct ReleaseQueue {
    pending: Vec<Box<dyn GpuResource>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `resource` for release at the next `flush`
    pub fn defer<R: GpuResource + 'static>(&mut self, resource: R) {
        self.push(Box::new(resource));
    }

    pub fn push(&mut self, resource: Box<dyn GpuResource>) {
        engine_debug!("gpubuf::ReleaseQueue", "deferred release of '{}'", resource.label());
        self.pending.push(resource);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Clean up everything queued, in the order it was queued
    ///
    /// Must be called outside command recording. A failing cleanup is
    /// logged and reported; the remaining resources are still released.
    pub fn flush(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for mut resource in self.pending.drain(..) {
            if let Err(e) = resource.cleanup() {
                engine_error!("gpubuf::ReleaseQueue", "cleanup of '{}' failed: {}", resource.label(), e);
                report.failures.push((resource.label().to_string(), e));
            }
            report.released += 1;
        }
        if report.released > 0 {
            engine_debug!("gpubuf::ReleaseQueue", "released {} resource(s)", report.released);
        }
        report
    }
}

impl Drop for ReleaseQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            engine_warn!(
                "gpubuf::ReleaseQueue",
                "dropped with {} resource(s) never flushed",
                self.pending.len()
            );
        }
    }
}

#[cfg(test)]
#[path = "release_queue_tests.rs"]
mod tests;
