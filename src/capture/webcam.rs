//! Webcam capture using nokhwa.
//!
//! A nokhwa camera is not `Send`, so each open device gets one worker
//! thread that owns the camera for its whole life. The handle forwards
//! calls over a channel and waits for the reply; the session already
//! runs those calls on the blocking pool.

use super::{CaptureBackend, DeviceError, DeviceHandle, PixelFormat, RawFrame};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

type Reply<T> = mpsc::Sender<Result<T, DeviceError>>;

enum Request {
    SetResolution(u32, u32, Reply<()>),
    Read(Reply<RawFrame>),
    Release(Reply<()>),
}

/// Backend opening native webcams.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebcamBackend;

impl WebcamBackend {
    pub fn new() -> Self {
        Self
    }

    /// List available webcam devices.
    pub fn list_devices() -> Result<Vec<String>, DeviceError> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }
}

impl CaptureBackend for WebcamBackend {
    fn open(&self, index: u32) -> Result<Box<dyn DeviceHandle>, DeviceError> {
        let (tx, rx) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DeviceError>>();
        let open = Arc::new(AtomicBool::new(false));
        let worker_open = Arc::clone(&open);

        thread::Builder::new()
            .name(format!("webcam-{}", index))
            .spawn(move || worker(index, rx, ready_tx, worker_open))
            .map_err(|e| DeviceError::OpenFailed(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| DeviceError::Worker("webcam worker exited during open".into()))??;

        Ok(Box::new(WebcamHandle {
            tx: Some(tx),
            open,
        }))
    }
}

/// Marks the device closed however the worker exits, panics included.
struct ClosedOnExit(Arc<AtomicBool>);

impl Drop for ClosedOnExit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn worker(
    index: u32,
    requests: mpsc::Receiver<Request>,
    ready: mpsc::Sender<Result<(), DeviceError>>,
    open: Arc<AtomicBool>,
) {
    let _closed = ClosedOnExit(Arc::clone(&open));
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(DeviceError::OpenFailed(e.to_string())));
            return;
        }
    };
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(DeviceError::OpenFailed(e.to_string())));
        return;
    }

    open.store(camera.is_stream_open(), Ordering::SeqCst);
    let resolution = camera.resolution();
    info!(
        index,
        width = resolution.width(),
        height = resolution.height(),
        fps = camera.frame_rate(),
        "Webcam stream opened"
    );
    if ready.send(Ok(())).is_err() {
        let _ = camera.stop_stream();
        return;
    }

    for request in requests {
        match request {
            Request::SetResolution(width, height, reply) => {
                let result = camera
                    .set_resolution(Resolution::new(width, height))
                    .map_err(|e| DeviceError::ConfigureFailed(e.to_string()));
                open.store(camera.is_stream_open(), Ordering::SeqCst);
                let _ = reply.send(result);
            }
            Request::Read(reply) => {
                let result = read_rgb(&mut camera);
                open.store(camera.is_stream_open(), Ordering::SeqCst);
                let _ = reply.send(result);
            }
            Request::Release(reply) => {
                let result = camera
                    .stop_stream()
                    .map_err(|e| DeviceError::ReleaseFailed(e.to_string()));
                open.store(false, Ordering::SeqCst);
                let _ = reply.send(result);
                break;
            }
        }
    }

    debug!(index, "Webcam worker exiting");
}

fn read_rgb(camera: &mut Camera) -> Result<RawFrame, DeviceError> {
    let buffer = camera
        .frame()
        .map_err(|e| DeviceError::ReadFailed(e.to_string()))?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| DeviceError::ReadFailed(e.to_string()))?;
    let (width, height) = (decoded.width(), decoded.height());
    Ok(RawFrame::new(
        decoded.into_raw(),
        width,
        height,
        PixelFormat::Rgb,
    ))
}

/// Handle to a webcam served by its worker thread.
pub struct WebcamHandle {
    tx: Option<mpsc::Sender<Request>>,
    open: Arc<AtomicBool>,
}

impl WebcamHandle {
    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, DeviceError> {
        let tx = self.tx.as_ref().ok_or(DeviceError::NotOpen)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(make(reply_tx))
            .map_err(|_| DeviceError::Worker("webcam worker gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| DeviceError::Worker("webcam worker dropped reply".into()))?
    }
}

impl DeviceHandle for WebcamHandle {
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        self.call(|reply| Request::SetResolution(width, height, reply))
    }

    fn is_open(&self) -> bool {
        self.tx.is_some() && self.open.load(Ordering::SeqCst)
    }

    fn read(&mut self) -> Result<RawFrame, DeviceError> {
        self.call(Request::Read)
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        let result = self.call(Request::Release);
        self.tx = None;
        result
    }
}

impl Drop for WebcamHandle {
    fn drop(&mut self) {
        if self.tx.is_some() {
            if let Err(e) = self.release() {
                warn!(error = %e, "Webcam release on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_panic_clears_open_flag() {
        let open = Arc::new(AtomicBool::new(true));
        let guard_flag = Arc::clone(&open);

        let result = thread::spawn(move || {
            let _closed = ClosedOnExit(guard_flag);
            panic!("driver fault");
        })
        .join();

        assert!(result.is_err());
        assert!(!open.load(Ordering::SeqCst));
    }

    #[test]
    fn test_released_handle_reports_closed() {
        let (tx, rx) = mpsc::channel::<Request>();
        drop(rx);
        let mut handle = WebcamHandle {
            tx: Some(tx),
            open: Arc::new(AtomicBool::new(true)),
        };
        assert!(handle.is_open());

        // Worker is gone, so release fails but still drops the channel.
        assert!(handle.release().is_err());
        assert!(!handle.is_open());
    }
}
