//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and scripted implementations for
//! testing. All calls here are blocking; the session dispatches them onto
//! the blocking pool.

use super::RawFrame;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("camera reported closed")]
    NotOpen,
    #[error("failed to configure camera: {0}")]
    ConfigureFailed(String),
    #[error("failed to read frame: {0}")]
    ReadFailed(String),
    #[error("failed to release camera: {0}")]
    ReleaseFailed(String),
    #[error("device worker failed: {0}")]
    Worker(String),
}

/// Opens capture devices by index.
///
/// Implementations must be cheap to share; the session holds one
/// backend for its whole life and calls `open` on every reopen.
pub trait CaptureBackend: Send + Sync + 'static {
    /// Acquires a handle for the device at `index`.
    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, DeviceError>;
}

/// An open capture device.
///
/// A handle is owned by exactly one session and is moved to a worker
/// for every call, so implementations need `Send` but not `Sync`.
pub trait DeviceHandle: Send {
    /// Requests a capture resolution. Drivers may refuse or adjust it.
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), DeviceError>;

    /// Checks if the device still reports itself open.
    ///
    /// Must not block: the control loop calls it directly.
    fn is_open(&self) -> bool;

    /// Reads exactly one frame.
    fn read(&mut self) -> Result<RawFrame, DeviceError>;

    /// Releases the device. Called at most once per handle.
    fn release(&mut self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DeviceError::OpenFailed("busy".into()).to_string(),
            "failed to open camera: busy"
        );
        assert_eq!(DeviceError::NotOpen.to_string(), "camera reported closed");
    }
}
