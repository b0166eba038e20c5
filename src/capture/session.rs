//! Device session: exclusive owner of one open capture handle.
//!
//! Every blocking device call runs on tokio's blocking pool. The handle
//! is moved into the worker closure and handed back with the result, so
//! the borrow checker enforces that no two calls ever overlap.

use super::{CaptureBackend, CaptureConfig, DeviceError, DeviceHandle, RawFrame};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns at most one open device handle.
pub struct DeviceSession {
    backend: Arc<dyn CaptureBackend>,
    device_index: u32,
    capture_size: (u32, u32),
    handle: Option<Box<dyn DeviceHandle>>,
}

impl DeviceSession {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: &CaptureConfig) -> Self {
        Self {
            backend,
            device_index: config.device_index,
            capture_size: (config.capture_width, config.capture_height),
            handle: None,
        }
    }

    /// Returns the configured device index.
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// Checks whether a handle is held and still reports itself open.
    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Releases any held handle, then acquires and configures a new one.
    ///
    /// A refused resolution is not an error: the device stays open at
    /// whatever size the driver picked.
    pub async fn open(&mut self) -> Result<(), DeviceError> {
        self.release().await;

        let backend = Arc::clone(&self.backend);
        let index = self.device_index;
        let (width, height) = self.capture_size;

        let handle = dispatch(move || {
            let mut handle = backend.open(index)?;
            if !handle.is_open() {
                if let Err(e) = handle.release() {
                    debug!(index, error = %e, "Release after closed open failed");
                }
                return Err(DeviceError::NotOpen);
            }
            if let Err(e) = handle.set_resolution(width, height) {
                warn!(
                    index,
                    width,
                    height,
                    error = %e,
                    "Requested resolution not accepted, using driver default"
                );
            }
            Ok(handle)
        })
        .await??;

        info!(index, "Camera opened");
        self.handle = Some(handle);
        Ok(())
    }

    /// Reads exactly one frame.
    ///
    /// If the worker panics the handle is lost with it and the session
    /// reports closed from then on.
    pub async fn read_frame(&mut self) -> Result<RawFrame, DeviceError> {
        let mut handle = self.handle.take().ok_or(DeviceError::NotOpen)?;

        let (handle, result) = dispatch(move || {
            let result = handle.read();
            (handle, result)
        })
        .await?;

        self.handle = Some(handle);
        result
    }

    /// Releases the held handle, if any. Never fails.
    pub async fn release(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let index = self.device_index;

        match dispatch(move || handle.release()).await {
            Ok(Ok(())) => debug!(index, "Camera released"),
            Ok(Err(e)) => warn!(index, error = %e, "Camera release failed"),
            Err(e) => warn!(index, error = %e, "Camera release worker failed"),
        }
    }
}

/// Runs a blocking device call on the blocking pool.
async fn dispatch<F, T>(f: F) -> Result<T, DeviceError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeviceError::Worker(e.to_string()))
}
