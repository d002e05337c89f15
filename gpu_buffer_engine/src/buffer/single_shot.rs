/// Single-shot command submission: "record one GPU operation, run it, wait"

use crate::device::{BufferHandle, CommandRecorder, GraphicsDevice, QueueId, SyncBarrier, TransferDescriptor};
use crate::error::{Error, Result};
use crate::{engine_error, engine_trace, engine_warn};

/// A command buffer recorded for exactly one submission
///
/// `begin` allocates it from the device's transient pool with the
/// one-time-submit hint; `submit` consumes the helper, so a recorded buffer
/// can never be submitted twice. Dropping it unsubmitted discards the
/// recorded commands.
pub struct SingleShotCommands<'d> {
    device: &'d dyn GraphicsDevice,
    recorder: Option<Box<dyn CommandRecorder>>,
}

impl<'d> SingleShotCommands<'d> {
    /// Allocate and begin a one-time-submit command buffer
    ///
    /// # Errors
    ///
    /// Whatever the device reports when its command pool is exhausted. The
    /// failure is logged here.
    pub fn begin(device: &'d dyn GraphicsDevice) -> Result<Self> {
        let recorder = device.create_single_shot_commands().map_err(|e| {
            engine_error!("gpubuf::SingleShot", "create_single_shot_commands failed: {}", e);
            e
        })?;
        Ok(Self { device, recorder: Some(recorder) })
    }

    pub fn copy_buffer(
        &mut self,
        src: BufferHandle,
        dst: BufferHandle,
        region: &TransferDescriptor,
    ) -> Result<()> {
        self.recorder()?.copy_buffer(src, dst, region)
    }

    pub fn buffer_barrier(&mut self, barrier: &SyncBarrier) -> Result<()> {
        self.recorder()?.buffer_barrier(barrier)
    }

    /// Commands recorded so far
    pub fn recorded_count(&self) -> usize {
        self.recorder.as_ref().map_or(0, |r| r.recorded_count())
    }

    /// End recording, submit to `queue` and block until the GPU is done
    ///
    /// # Errors
    ///
    /// `Error::SubmitError` when ending, submitting or waiting failed. The
    /// contents of every buffer written by this command buffer are undefined
    /// afterwards. Nothing is retried.
    pub fn submit(mut self, queue: QueueId) -> Result<()> {
        let recorder = self.recorder.take().ok_or_else(|| {
            Error::InvalidResource("single-shot command buffer already submitted".to_string())
        })?;
        let count = recorder.recorded_count();

        match self.device.submit_single_shot(recorder, queue) {
            Ok(()) => {
                engine_trace!("gpubuf::SingleShot", "submitted {} command(s) to queue {}", count, queue.0);
                Ok(())
            }
            Err(e) => {
                engine_error!("gpubuf::SingleShot", "submit_single_shot failed on queue {}: {}", queue.0, e);
                Err(match e {
                    Error::SubmitError(_) => e,
                    other => Error::SubmitError(other.to_string()),
                })
            }
        }
    }

    fn recorder(&mut self) -> Result<&mut Box<dyn CommandRecorder>> {
        self.recorder.as_mut().ok_or_else(|| {
            Error::InvalidResource("single-shot command buffer already submitted".to_string())
        })
    }
}

impl Drop for SingleShotCommands<'_> {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            engine_warn!(
                "gpubuf::SingleShot",
                "discarding unsubmitted single-shot command buffer ({} command(s))",
                recorder.recorded_count()
            );
        }
    }
}

#[cfg(test)]
#[path = "single_shot_tests.rs"]
mod tests;
