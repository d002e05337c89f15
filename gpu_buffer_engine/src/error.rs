//! Error types for the GPU buffer engine
//!
//! Every fallible operation returns [`Result`]. Failures are logged at the
//! point where they happen (operation name + backend error code) and then
//! propagated to the immediate caller. Nothing in this crate retries.

use std::fmt;

use crate::device::BufferRole;

/// Result type for buffer engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Buffer engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Device or host memory allocation failed for one buffer of a pair.
    ///
    /// Non-recoverable for that buffer: the owner must `cleanup` before
    /// trying again.
    AllocationError {
        /// Which allocation of the pair failed
        role: BufferRole,
        /// Requested size in bytes
        size: u64,
        /// Backend message (includes the backend error code)
        reason: String,
    },

    /// Mapping a host-visible buffer failed
    MapError(String),

    /// Single-shot command buffer submission or its completion wait failed.
    ///
    /// The destination buffer contents are undefined afterwards.
    SubmitError(String),

    /// Backend allocator ran out of memory
    OutOfMemory,

    /// Invalid resource (unknown handle, buffer already cleaned up, range out of bounds)
    InvalidResource(String),

    /// Backend-specific error (Vulkan, mock, ...)
    BackendError(String),

    /// Device creation failed
    InitializationFailed(String),
}

impl Error {
    /// True for [`Error::AllocationError`] and [`Error::OutOfMemory`]
    pub fn is_allocation(&self) -> bool {
        matches!(self, Error::AllocationError { .. } | Error::OutOfMemory)
    }

    /// True for [`Error::MapError`]
    pub fn is_map(&self) -> bool {
        matches!(self, Error::MapError(_))
    }

    /// True for [`Error::SubmitError`]
    pub fn is_submit(&self) -> bool {
        matches!(self, Error::SubmitError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AllocationError { role, size, reason } => {
                write!(f, "Allocation error ({} buffer, {} bytes): {}", role, size, reason)
            }
            Error::MapError(msg) => write!(f, "Map error: {}", msg),
            Error::SubmitError(msg) => write!(f, "Submit error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
